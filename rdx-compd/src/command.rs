//! Decoding and routing of operator commands.
//!
//! Every controller sees every message on `comp.command`. A controller builds
//! a [`Dispatcher`] at start-up listing only the commands it owns; anything
//! else dispatches to `None` and is ignored. That is how one broadcast channel
//! gives each controller a disjoint set of commands without a central router.

use crate::error::{CompdError, Result};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A decoded `{"command": <name>, ...args}` envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandEnvelope {
    pub name: String,
    pub args: CommandArgs,
}

impl CommandEnvelope {
    pub fn new(name: &str) -> Self {
        Self {
            name: normalize(name),
            args: CommandArgs {
                command: normalize(name),
                values: Map::new(),
            },
        }
    }

    pub fn with_arg(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.args.values.insert(name.to_string(), value.into());
        self
    }

    pub fn parse(payload: &str) -> Result<Self> {
        let mut values = match serde_json::from_str::<Value>(payload)? {
            Value::Object(values) => values,
            other => {
                return Err(CompdError::MalformedEnvelope(format!(
                    "expected an object, got {other}"
                )))
            }
        };
        let name = match values.remove("command") {
            Some(Value::String(name)) => normalize(&name),
            _ => {
                return Err(CompdError::MalformedEnvelope(
                    "missing string field 'command'".to_string(),
                ))
            }
        };
        Ok(Self {
            args: CommandArgs {
                command: name.clone(),
                values,
            },
            name,
        })
    }

    /// The wire form, as published on `comp.command`.
    pub fn encode(&self) -> String {
        let mut values = self.args.values.clone();
        values.insert("command".to_string(), Value::String(self.name.clone()));
        Value::Object(values).to_string()
    }
}

/// Command names are hyphenated; older tools sometimes send underscores.
fn normalize(name: &str) -> String {
    name.replace('_', "-")
}

/// The named arguments of one command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandArgs {
    command: String,
    values: Map<String, Value>,
}

impl CommandArgs {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.values
            .get(name)
            .or_else(|| self.values.get(&name.replace('-', "_")))
            .or_else(|| self.values.get(&name.replace('_', "-")))
            .filter(|value| !value.is_null())
    }

    fn decode<T: DeserializeOwned>(&self, name: &str, value: &Value) -> Result<T> {
        serde_json::from_value(value.clone()).map_err(|e| CompdError::InvalidArgument {
            command: self.command.clone(),
            argument: name.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn required<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        match self.lookup(name) {
            Some(value) => self.decode(name, value),
            None => Err(CompdError::MissingArgument {
                command: self.command.clone(),
                argument: name.to_string(),
            }),
        }
    }

    /// An argument that may be absent or `null`.
    pub fn optional<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        self.lookup(name)
            .map(|value| self.decode(name, value))
            .transpose()
    }

    pub fn optional_or<T: DeserializeOwned>(&self, name: &str, default: T) -> Result<T> {
        Ok(self.optional(name)?.unwrap_or(default))
    }
}

/// Turns the arguments of one command into a typed command value.
pub type CommandParser<T> = fn(&CommandArgs) -> Result<T>;

/// An explicit map from command names to the parsers a controller owns.
#[derive(Debug)]
pub struct Dispatcher<T> {
    handlers: HashMap<&'static str, CommandParser<T>>,
}

impl<T> Default for Dispatcher<T> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<T> Dispatcher<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, name: &'static str, parser: CommandParser<T>) -> Self {
        self.handlers.insert(name, parser);
        self
    }

    pub fn handles(&self, name: &str) -> bool {
        self.handlers.contains_key(normalize(name).as_str())
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Decodes a raw payload and routes it. `Ok(None)` means the command
    /// belongs to some other controller.
    pub fn dispatch(&self, payload: &str) -> Result<Option<T>> {
        self.dispatch_envelope(&CommandEnvelope::parse(payload)?)
    }

    pub fn dispatch_envelope(&self, envelope: &CommandEnvelope) -> Result<Option<T>> {
        match self.handlers.get(envelope.name.as_str()) {
            Some(parser) => parser(&envelope.args).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum Probe {
        Ping,
        Delay { start: i64, by: i64 },
    }

    fn dispatcher() -> Dispatcher<Probe> {
        Dispatcher::new()
            .register("ping", |_| Ok(Probe::Ping))
            .register("delay-matches", |args| {
                Ok(Probe::Delay {
                    start: args.required("start")?,
                    by: args.optional_or("by", 60)?,
                })
            })
    }

    #[test]
    fn unknown_commands_are_ignored() {
        assert_eq!(dispatcher().dispatch(r#"{"command": "music-play"}"#).unwrap(), None);
    }

    #[test]
    fn routes_with_defaults() {
        let command = dispatcher()
            .dispatch(r#"{"command": "delay-matches", "start": 1500}"#)
            .unwrap();
        assert_eq!(command, Some(Probe::Delay { start: 1500, by: 60 }));
    }

    #[test]
    fn underscored_names_and_arguments_are_accepted() {
        let envelope = CommandEnvelope::new("delay_matches")
            .with_arg("start", 10)
            .with_arg("by", 5);
        assert_eq!(envelope.name, "delay-matches");
        let command = dispatcher().dispatch(&envelope.encode()).unwrap();
        assert_eq!(command, Some(Probe::Delay { start: 10, by: 5 }));
        assert!(dispatcher().handles("delay_matches"));
    }

    #[test]
    fn missing_required_argument_fails() {
        let err = dispatcher()
            .dispatch(r#"{"command": "delay-matches", "by": 5}"#)
            .unwrap_err();
        assert!(matches!(err, CompdError::MissingArgument { ref argument, .. } if argument == "start"));
    }

    #[test]
    fn malformed_envelopes_fail() {
        assert!(dispatcher().dispatch("not json").is_err());
        assert!(dispatcher().dispatch("[1, 2]").is_err());
        assert!(dispatcher().dispatch(r#"{"name": "ping"}"#).is_err());
        assert!(matches!(
            dispatcher().dispatch(r#"{"command": "delay-matches", "start": "soon"}"#),
            Err(CompdError::InvalidArgument { .. })
        ));
    }
}

// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::collections::BTreeMap;
use std::ffi::OsString;

use tracing::debug;

use crate::config::{Ini, Section};
use crate::error::ErrorKind;
use crate::Error;

/// Sections whose name starts with this declare a program
pub const PROGRAM_PREFIX: &str = "program:";

/// Environment handed to a program's commands
pub type Environment = BTreeMap<OsString, OsString>;

/// Snapshot of the supervisor's own environment
pub fn inherited_environment() -> Environment {
    std::env::vars_os().collect()
}

/// One supervised program
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgramEntry {
    name: String,
    start: Vec<String>,
    stop: Vec<String>,
    environment: Environment,
}

impl ProgramEntry {
    /// Creates an entry, both commands must have at least the executable
    pub fn new(
        name: impl Into<String>,
        start: Vec<String>,
        stop: Vec<String>,
        environment: Environment,
    ) -> Result<Self, Error> {
        let name = name.into();
        if start.is_empty() {
            return Err(ErrorKind::EmptyCommand {
                program: name,
                key: "start",
            }
            .into());
        }
        if stop.is_empty() {
            return Err(ErrorKind::EmptyCommand {
                program: name,
                key: "stop",
            }
            .into());
        }

        Ok(Self {
            name,
            start,
            stop,
            environment,
        })
    }

    /// Builds the entry for a `[program:<name>]` section on top of its own copy of `base`
    fn from_section(name: &str, section: &Section, base: &Environment) -> Result<Self, Error> {
        let start = split_command(required(name, section, "start")?);
        let stop = split_command(required(name, section, "stop")?);

        let mut environment = base.clone();
        if let Some(overrides) = section.get("environment") {
            for (key, value) in parse_environment(name, overrides)? {
                environment.insert(OsString::from(key), OsString::from(value));
            }
        }

        Self::new(name, start, stop, environment)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start_command(&self) -> &[String] {
        &self.start
    }

    pub fn stop_command(&self) -> &[String] {
        &self.stop
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }
}

fn required<'s>(program: &str, section: &'s Section, key: &'static str) -> Result<&'s str, Error> {
    section.get(key).ok_or_else(|| {
        ErrorKind::MissingKey {
            program: program.to_string(),
            key,
        }
        .into()
    })
}

fn split_command(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}

/// Parses `KEY=VALUE, KEY2=VALUE2`, keys and values are trimmed
///
/// Every comma separated item must be a pair, so an empty value or a trailing comma is rejected.
pub fn parse_environment(program: &str, value: &str) -> Result<Vec<(String, String)>, Error> {
    let mut pairs = Vec::new();

    for item in value.split(',') {
        let malformed = || -> Error {
            ErrorKind::MalformedEnvironment {
                program: program.to_string(),
                pair: item.trim().to_string(),
            }
            .into()
        };

        let (key, value) = item.split_once('=').ok_or_else(malformed)?;
        let key = key.trim();
        if key.is_empty() {
            return Err(malformed());
        }

        pairs.push((key.to_string(), value.trim().to_string()));
    }

    Ok(pairs)
}

/// Programs in declaration order
///
/// The order is the start order, its reverse is the stop order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProgramRegistry {
    entries: Vec<ProgramEntry>,
}

impl ProgramRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the registry from every `program:` section of the configuration
    pub fn from_config(ini: &Ini, base: &Environment) -> Result<Self, Error> {
        let mut registry = Self::new();

        for section in ini.sections() {
            let name = match section.name().strip_prefix(PROGRAM_PREFIX) {
                Some(name) => name,
                None => {
                    debug!(section = section.name(), "ignoring section");
                    continue;
                }
            };

            registry.insert(ProgramEntry::from_section(name, section, base)?);
        }

        Ok(registry)
    }

    /// Adds an entry, an entry of the same name is replaced in place
    pub fn insert(&mut self, entry: ProgramEntry) {
        match self.entries.iter_mut().find(|e| e.name == entry.name) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ProgramEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in start order
    pub fn start_order(&self) -> impl Iterator<Item = &ProgramEntry> {
        self.entries.iter()
    }

    /// Entries in stop order
    pub fn stop_order(&self) -> impl Iterator<Item = &ProgramEntry> {
        self.entries.iter().rev()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn base() -> Environment {
        let mut env = Environment::new();
        env.insert("PATH".into(), "/bin".into());
        env
    }

    fn names<'a>(entries: impl Iterator<Item = &'a ProgramEntry>) -> Vec<&'a str> {
        entries.map(ProgramEntry::name).collect()
    }

    #[test]
    fn test_start_and_stop_order() {
        let ini = Ini::parse(
            "[program:a]\nstart = /bin/true\nstop = /bin/true\n\
             [other]\nkey = value\n\
             [program:b]\nstart = /bin/true\nstop = /bin/true\n\
             [program:c]\nstart = /bin/true\nstop = /bin/true\n",
        )
        .unwrap();

        let registry = ProgramRegistry::from_config(&ini, &base()).unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(names(registry.start_order()), vec!["a", "b", "c"]);
        assert_eq!(names(registry.stop_order()), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_commands_split_on_whitespace() {
        let ini = Ini::parse("[program:web]\nstart = /usr/sbin/nginx  -g   daemon\nstop = /usr/sbin/nginx -s quit\n")
            .unwrap();
        let registry = ProgramRegistry::from_config(&ini, &base()).unwrap();
        let web = registry.get("web").unwrap();

        assert_eq!(web.start_command(), &["/usr/sbin/nginx", "-g", "daemon"]);
        assert_eq!(web.stop_command(), &["/usr/sbin/nginx", "-s", "quit"]);
    }

    #[test]
    fn test_environment_merge() {
        let ini = Ini::parse(
            "[program:a]\nstart = /bin/true\nstop = /bin/true\nenvironment = FOO=1, BAR= 2 \n",
        )
        .unwrap();
        let registry = ProgramRegistry::from_config(&ini, &base()).unwrap();

        let mut expected = base();
        expected.insert("FOO".into(), "1".into());
        expected.insert("BAR".into(), "2".into());
        assert_eq!(registry.get("a").unwrap().environment(), &expected);
    }

    #[test]
    fn test_environment_not_shared_between_entries() {
        let ini = Ini::parse(
            "[program:a]\nstart = /bin/true\nstop = /bin/true\nenvironment = FOO=1, PATH=/opt/bin\n\
             [program:b]\nstart = /bin/true\nstop = /bin/true\n",
        )
        .unwrap();
        let registry = ProgramRegistry::from_config(&ini, &base()).unwrap();

        assert_eq!(registry.get("a").unwrap().environment().get(&OsString::from("PATH")), Some(&OsString::from("/opt/bin")));
        assert_eq!(registry.get("b").unwrap().environment(), &base());
    }

    #[test]
    fn test_parse_environment() {
        assert_eq!(
            parse_environment("a", "A=1,B = two words , URL=http://x?a=b").unwrap(),
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "two words".to_string()),
                ("URL".to_string(), "http://x?a=b".to_string()),
            ]
        );
        assert_eq!(parse_environment("a", "EMPTY=").unwrap(), vec![("EMPTY".to_string(), String::new())]);

        let err = parse_environment("a", "A=1, NOPE").unwrap_err();
        match err.kind() {
            ErrorKind::MalformedEnvironment { program, pair } => {
                assert_eq!(program, "a");
                assert_eq!(pair, "NOPE");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(parse_environment("a", "=1").is_err());
    }

    #[test]
    fn test_parse_environment_rejects_empty_items() {
        for value in &["FOO=1,", "FOO=1,,BAR=2", "", "  "] {
            let err = parse_environment("a", value).unwrap_err();
            assert!(
                matches!(err.kind(), ErrorKind::MalformedEnvironment { .. }),
                "accepted {:?}",
                value
            );
        }

        let ini = Ini::parse("[program:a]\nstart = /bin/true\nstop = /bin/true\nenvironment =\n").unwrap();
        let err = ProgramRegistry::from_config(&ini, &base()).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::MalformedEnvironment { .. }));
    }

    #[test]
    fn test_missing_keys() {
        let ini = Ini::parse("[program:a]\nstart = /bin/true\n").unwrap();
        let err = ProgramRegistry::from_config(&ini, &base()).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::MissingKey { key: "stop", .. }));

        let ini = Ini::parse("[program:a]\nstop = /bin/true\n").unwrap();
        let err = ProgramRegistry::from_config(&ini, &base()).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::MissingKey { key: "start", .. }));

        let ini = Ini::parse("[program:a]\nstart =\nstop = /bin/true\n").unwrap();
        let err = ProgramRegistry::from_config(&ini, &base()).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::EmptyCommand { key: "start", .. }));
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let entry = |name: &str, cmd: &str| {
            ProgramEntry::new(name, vec![cmd.to_string()], vec![cmd.to_string()], Environment::new()).unwrap()
        };

        let mut registry = ProgramRegistry::new();
        registry.insert(entry("a", "one"));
        registry.insert(entry("b", "two"));
        registry.insert(entry("a", "three"));

        assert_eq!(names(registry.start_order()), vec!["a", "b"]);
        assert_eq!(registry.get("a").unwrap().start_command(), &["three"]);
    }

    #[test]
    fn test_empty_registry() {
        let ini = Ini::parse("[unrelated]\nkey = value\n").unwrap();
        let registry = ProgramRegistry::from_config(&ini, &base()).unwrap();
        assert!(registry.is_empty());
    }
}

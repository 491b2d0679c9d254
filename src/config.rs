// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Reading of the INI style configuration file
//!
//! ```ini
//! [program:web]
//! start = /usr/sbin/nginx
//! stop = /usr/sbin/nginx -s quit
//! environment = FOO=1, BAR=2
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ErrorKind;
use crate::Error;

/// Name of the configuration file looked up in the working directory
pub const DEFAULT_CONFIG: &str = "waiter.conf";

/// A single `[name]` section, keys are stored lower-cased in the order they first appear
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Section {
    name: String,
    options: Vec<(String, String)>,
}

impl Section {
    fn new(name: String) -> Self {
        Self {
            name,
            options: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lookup an option, keys are case-insensitive
    pub fn get(&self, key: &str) -> Option<&str> {
        let key = key.to_ascii_lowercase();
        self.options
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    fn set(&mut self, key: String, value: String) {
        match self.options.iter_mut().find(|(k, _)| *k == key) {
            Some(option) => option.1 = value,
            None => self.options.push((key, value)),
        }
    }

    fn append(&mut self, key: &str, line: &str) {
        if let Some(option) = self.options.iter_mut().find(|(k, _)| k == key) {
            option.1.push('\n');
            option.1.push_str(line);
        }
    }
}

/// Parsed configuration, sections are kept in declaration order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ini {
    sections: Vec<Section>,
}

impl Ini {
    /// Parses the configuration text
    ///
    /// A repeated section header merges into the first declaration of that section, keeping its position.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut ini = Ini::default();
        let mut current: Option<usize> = None;
        let mut last_key: Option<String> = None;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let trimmed = raw.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            // continuation of the previous value
            if raw.starts_with(char::is_whitespace) {
                match (current, last_key.as_ref()) {
                    (Some(section), Some(key)) => {
                        ini.sections[section].append(key, trimmed);
                        continue;
                    }
                    _ => return Err(syntax(line_no, "continuation line without an option")),
                }
            }

            if trimmed.starts_with('[') {
                // anything after the closing bracket is ignored, e.g. `[program:web] ; frontend`
                let name = trimmed[1..]
                    .split_once(']')
                    .map(|(name, _)| name.trim())
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| syntax(line_no, "malformed section header"))?;

                current = Some(ini.section_index(name));
                last_key = None;
                continue;
            }

            let section = current.ok_or_else(|| syntax(line_no, "option outside of a section"))?;
            let split = trimmed
                .find(|c: char| c == '=' || c == ':')
                .ok_or_else(|| syntax(line_no, "expected 'key = value'"))?;

            let key = trimmed[..split].trim().to_ascii_lowercase();
            if key.is_empty() {
                return Err(syntax(line_no, "option without a key"));
            }
            let value = strip_inline_comment(&trimmed[split + 1..]).trim().to_string();

            ini.sections[section].set(key.clone(), value);
            last_key = Some(key);
        }

        Ok(ini)
    }

    /// Reads and parses the file at `path`
    pub fn read(path: &Path) -> Result<Self, Error> {
        debug!(path = %path.display(), "reading configuration");
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    fn section_index(&mut self, name: &str) -> usize {
        match self.sections.iter().position(|s| s.name == name) {
            Some(idx) => idx,
            None => {
                self.sections.push(Section::new(name.to_string()));
                self.sections.len() - 1
            }
        }
    }
}

/// Cuts a value at the first `;` that follows whitespace, `a;b` is kept as is
fn strip_inline_comment(value: &str) -> &str {
    match value.find(';') {
        Some(pos) if value[..pos].ends_with(char::is_whitespace) => &value[..pos],
        _ => value,
    }
}

fn syntax(line: usize, msg: &str) -> Error {
    Error::from(ErrorKind::ConfigSyntax {
        line,
        msg: msg.to_string(),
    })
}

/// Finds the configuration file to use
///
/// An explicit path must exist, otherwise `waiter.conf` in `cwd` is used if present.
pub fn locate(explicit: Option<&Path>, cwd: &Path) -> Result<PathBuf, Error> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => cwd.join(DEFAULT_CONFIG),
    };

    if path.is_file() {
        Ok(path)
    } else {
        Err(ErrorKind::ConfigNotFound(path).into())
    }
}

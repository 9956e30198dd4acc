//! Java-style `.properties` files and line-per-option `jvm.config`.

use std::fmt;

use indexmap::IndexMap;

/// Ordered key/value pairs of a `.properties` file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties(IndexMap<String, String>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `key=value`, `key:value` and `key value` lines. `#` and `!`
    /// start a comment line; blank lines are skipped. A repeated key keeps
    /// its first position and takes the last value. A line with no key is
    /// an error naming the line.
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut props = Self::new();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let (key, value) = match line.find(|c: char| c == '=' || c == ':' || c.is_whitespace()) {
                Some(at) => {
                    let key = &line[..at];
                    let mut rest = line[at..].trim_start();
                    if let Some(stripped) = rest.strip_prefix(|c: char| c == '=' || c == ':') {
                        rest = stripped.trim_start();
                    }
                    (key, rest)
                }
                None => (line, ""),
            };
            if key.is_empty() {
                return Err(format!("line {}: missing key before '{}'", number + 1, value));
            }
            props.set(key, value);
        }
        Ok(props)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.shift_remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Overlays `other` key by key.
    pub fn merge(&mut self, other: &Properties) {
        for (key, value) in other.iter() {
            self.set(key, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Applies `f` to every value.
    pub fn try_map_values<E>(&self, mut f: impl FnMut(&str) -> Result<String, E>) -> Result<Self, E> {
        let mut mapped = Self::new();
        for (key, value) in self.iter() {
            mapped.set(key, f(value)?);
        }
        Ok(mapped)
    }
}

impl fmt::Display for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in self.iter() {
            writeln!(f, "{}={}", key, value)?;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut props = Self::new();
        for (key, value) in iter {
            props.set(key, value);
        }
        props
    }
}

/// JVM options, one per line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JvmConfig(pub Vec<String>);

impl JvmConfig {
    pub fn parse(text: &str) -> Self {
        Self(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(String::from)
                .collect(),
        )
    }

    pub fn options(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for JvmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for option in &self.0 {
            writeln!(f, "{}", option)?;
        }
        Ok(())
    }
}

use crate::core::domain::{EnvironmentCatalog, EnvironmentId};

/// Ordered substring rules mapping a language key to a judge environment.
#[derive(Clone, Debug)]
pub struct EnvironmentRules {
    rules: Vec<(String, Vec<String>)>,
}

impl EnvironmentRules {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Replaces the patterns for `language_key` if it already has a rule.
    pub fn with_rule(mut self, language_key: &str, patterns: &[&str]) -> Self {
        let patterns = patterns.iter().map(|p| p.to_string()).collect();
        match self.rules.iter_mut().find(|(key, _)| key == language_key) {
            Some((_, existing)) => *existing = patterns,
            None => self.rules.push((language_key.to_string(), patterns)),
        }
        self
    }

    pub fn patterns(&self, language_key: &str) -> Option<&[String]> {
        self.rules
            .iter()
            .find(|(key, _)| key == language_key)
            .map(|(_, patterns)| patterns.as_slice())
    }

    pub fn language_keys(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|(key, _)| key.as_str())
    }

    /// Returns the id of the first catalog entry matching the first pattern
    /// that matches anything. `None` means the language is not supported by
    /// this judge, which callers treat as bad user input.
    pub fn resolve(
        &self,
        catalog: &EnvironmentCatalog,
        language_key: &str,
    ) -> Option<EnvironmentId> {
        let patterns = self.patterns(language_key)?;
        patterns.iter().find_map(|pattern| {
            catalog
                .iter()
                .find(|environment| environment.name.contains(pattern.as_str()))
                .map(|environment| environment.id)
        })
    }
}

impl Default for EnvironmentRules {
    fn default() -> Self {
        EnvironmentRules::empty()
            .with_rule("java", &["Java ("])
            .with_rule("c", &["C (GCC "])
            .with_rule("cpp", &["C++ (GCC "])
            .with_rule("python", &["Python (3.", "Python ("])
            .with_rule("sql", &["SQL (SQLite"])
            .with_rule("csharp", &["C# ("])
            .with_rule("vb", &["Visual Basic.Net"])
            .with_rule("javascript", &["JavaScript (Node.js"])
    }
}

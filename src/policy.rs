//! Language allow-list and alias resolution.
//!
//! The default tables are immutable constants. Each [`LanguagePolicy`]
//! copies them at construction so overriding one executor's policy never
//! leaks into another.

use std::collections::HashMap;

/// Languages known to the executor and whether they may run.
pub const DEFAULT_EXECUTION_POLICY: &[(&str, bool)] = &[
    ("bash", true),
    ("shell", true),
    ("sh", true),
    ("pwsh", true),
    ("powershell", true),
    ("ps1", true),
    ("python", true),
    ("javascript", false),
    ("html", false),
    ("css", false),
];

pub const DEFAULT_LANGUAGE_ALIASES: &[(&str, &str)] = &[("py", "python"), ("js", "javascript")];

/// Outcome of a policy lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Support {
    /// Known and allowed to run.
    Allowed,
    /// Known but switched off: the code is saved, never executed.
    Disabled,
    /// Not in the policy at all. Aborts the batch.
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLanguage {
    /// Case-folded, alias-resolved name.
    pub name: String,
    pub support: Support,
}

impl ResolvedLanguage {
    pub fn is_executable(&self) -> bool {
        self.support == Support::Allowed
    }
}

#[derive(Debug, Clone)]
pub struct LanguagePolicy {
    policy: HashMap<String, bool>,
    aliases: HashMap<String, String>,
}

impl Default for LanguagePolicy {
    fn default() -> Self {
        Self {
            policy: DEFAULT_EXECUTION_POLICY
                .iter()
                .map(|(lang, allowed)| (lang.to_string(), *allowed))
                .collect(),
            aliases: DEFAULT_LANGUAGE_ALIASES
                .iter()
                .map(|(alias, canonical)| (alias.to_string(), canonical.to_string()))
                .collect(),
        }
    }
}

impl LanguagePolicy {
    /// Default tables with caller overrides applied on top.
    pub fn with_overrides(
        policy: &HashMap<String, bool>,
        aliases: &HashMap<String, String>,
    ) -> Self {
        let mut this = Self::default();
        for (lang, allowed) in policy {
            this.set_policy(lang, *allowed);
        }
        for (alias, canonical) in aliases {
            this.set_alias(alias, canonical);
        }
        this
    }

    pub fn set_policy(&mut self, language: &str, allowed: bool) {
        self.policy.insert(language.trim().to_lowercase(), allowed);
    }

    pub fn set_alias(&mut self, alias: &str, canonical: &str) {
        self.aliases
            .insert(alias.trim().to_lowercase(), canonical.trim().to_lowercase());
    }

    /// Normalizes `language` and looks it up.
    ///
    /// Aliases are applied once, not transitively.
    pub fn resolve(&self, language: &str) -> ResolvedLanguage {
        let folded = language.trim().to_lowercase();
        let name = self.aliases.get(&folded).cloned().unwrap_or(folded);
        let support = match self.policy.get(&name) {
            Some(true) => Support::Allowed,
            Some(false) => Support::Disabled,
            None => Support::Unsupported,
        };
        ResolvedLanguage { name, support }
    }
}

use std::sync::LazyLock;

use mission_core::Category;

pub const ROOT_DOCUMENTS: [&str; 5] = ["AGENTS.md", "TOOLS.md", "MEMORY.md", "SOUL.md", "USER.md"];

static DEFAULT_RULES: LazyLock<ClassifierRules> = LazyLock::new(ClassifierRules::default);

/// Prefix and filename rules mapping a key to its category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierRules {
    pub memory_root: String,
    pub config_files: Vec<String>,
    pub project_roots: Vec<String>,
}

impl Default for ClassifierRules {
    fn default() -> Self {
        Self {
            memory_root: "memory".into(),
            config_files: ROOT_DOCUMENTS.iter().map(|name| name.to_string()).collect(),
            project_roots: vec!["projects".into(), "apps".into()],
        }
    }
}

impl ClassifierRules {
    /// First match wins; anything unmatched is a plain document.
    pub fn classify(&self, relative_path: &str) -> Category {
        let normalized = relative_path.replace('\\', "/");
        let first = normalized.split('/').next().unwrap_or_default();
        let last = normalized.rsplit('/').next().unwrap_or_default();

        if first == self.memory_root {
            Category::Memory
        } else if self.config_files.iter().any(|name| name == last) {
            Category::Config
        } else if self.project_roots.iter().any(|root| root == first) {
            Category::Project
        } else {
            Category::Document
        }
    }
}

pub fn classify(relative_path: &str) -> Category {
    DEFAULT_RULES.classify(relative_path)
}

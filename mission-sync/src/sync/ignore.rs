/// Path rules that keep version control, build output, editor droppings and
/// hidden entries out of the inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreRules {
    pub dir_names: Vec<String>,
    pub file_names: Vec<String>,
    pub suffixes: Vec<String>,
    pub ignore_hidden: bool,
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self {
            dir_names: [".git", "node_modules", ".next", "out", "dist", "build"]
                .map(String::from)
                .to_vec(),
            file_names: vec![".DS_Store".into()],
            suffixes: [".log", ".tmp", ".swp", "~"].map(String::from).to_vec(),
            ignore_hidden: true,
        }
    }
}

impl IgnoreRules {
    /// Matches against the path with separators normalized to `/`. Any
    /// segment can trigger a directory rule; name rules apply to the last one.
    pub fn is_ignored(&self, relative_path: &str) -> bool {
        let normalized = relative_path.replace('\\', "/");
        let segments: Vec<&str> = normalized
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .collect();
        let Some(name) = segments.last() else {
            return false;
        };

        let dir_hit = segments.iter().any(|segment| {
            self.dir_names.iter().any(|dir| dir == segment)
                || (self.ignore_hidden && segment.starts_with('.') && *segment != "..")
        });
        dir_hit
            || self.file_names.iter().any(|file| file == name)
            || self.suffixes.iter().any(|suffix| name.ends_with(suffix.as_str()))
    }
}

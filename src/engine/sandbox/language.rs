use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::engine::error::EngineError;

/// How to launch one language's interpreter against a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeDescriptor {
    pub extension: String,
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub env: Vec<(String, String)>,
}

impl RuntimeDescriptor {
    pub fn new(extension: &str, command: &str, timeout: Duration) -> Self {
        let mut parts = command.split_whitespace().map(ToString::to_string);
        let program = parts.next().unwrap_or_default();
        Self {
            extension: extension.to_string(),
            program,
            args: parts.collect(),
            timeout,
            env: Vec::new(),
        }
    }

    pub fn with_env(mut self, key: &str, value: impl Into<String>) -> Self {
        self.env.push((key.to_string(), value.into()));
        self
    }

    pub fn source_name(&self) -> String {
        format!("script{}", self.extension)
    }

    pub fn source_path(&self, work_dir: &Path) -> PathBuf {
        work_dir.join(self.source_name())
    }
}

/// Immutable language id -> runtime table, shared read-only by every execution.
#[derive(Debug, Clone, Default)]
pub struct LanguageRegistry {
    entries: BTreeMap<String, RuntimeDescriptor>,
}

impl LanguageRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builtin(default_timeout: Duration, node_path: Option<&Path>) -> Self {
        let node = |descriptor: RuntimeDescriptor| match node_path {
            Some(path) => descriptor.with_env("NODE_PATH", path.display().to_string()),
            None => descriptor,
        };

        Self::empty()
            .with(
                "javascript",
                node(RuntimeDescriptor::new(".js", "node", default_timeout)),
            )
            .with(
                "python",
                RuntimeDescriptor::new(".py", "python3", default_timeout),
            )
            .with(
                "typescript",
                node(RuntimeDescriptor::new(".ts", "npx ts-node", default_timeout)),
            )
    }

    pub fn with(mut self, language: &str, descriptor: RuntimeDescriptor) -> Self {
        self.entries.insert(language.to_string(), descriptor);
        self
    }

    pub fn resolve(&self, language: &str) -> Result<&RuntimeDescriptor, EngineError> {
        self.entries
            .get(language)
            .ok_or_else(|| EngineError::UnsupportedLanguage {
                language: language.to_string(),
                supported: self.supported(),
            })
    }

    pub fn supported(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::{path::Path, time::Duration};

    use super::{LanguageRegistry, RuntimeDescriptor};
    use crate::engine::error::EngineError;

    #[test]
    fn builtin_covers_node_and_python() {
        let registry =
            LanguageRegistry::builtin(Duration::from_secs(10), Some(Path::new("/srv/node_modules")));

        let py = registry.resolve("python").unwrap();
        assert_eq!(py.program, "python3");
        assert!(py.args.is_empty());
        assert_eq!(py.source_name(), "script.py");
        assert!(py.env.is_empty());

        let ts = registry.resolve("typescript").unwrap();
        assert_eq!(ts.program, "npx");
        assert_eq!(ts.args, vec!["ts-node".to_string()]);
        assert_eq!(
            ts.env,
            vec![("NODE_PATH".to_string(), "/srv/node_modules".to_string())]
        );

        assert_eq!(
            registry.supported(),
            vec!["javascript", "python", "typescript"]
        );
    }

    #[test]
    fn unknown_language_is_not_supported() {
        let registry = LanguageRegistry::builtin(Duration::from_secs(1), None);
        let err = registry.resolve("Python").unwrap_err();
        match err {
            EngineError::UnsupportedLanguage { language, supported } => {
                assert_eq!(language, "Python");
                assert_eq!(supported.len(), 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn entries_can_be_replaced() {
        let registry = LanguageRegistry::builtin(Duration::from_secs(10), None).with(
            "python",
            RuntimeDescriptor::new(".py", "python3 -u", Duration::from_secs(2)),
        );
        let py = registry.resolve("python").unwrap();
        assert_eq!(py.args, vec!["-u".to_string()]);
        assert_eq!(py.timeout, Duration::from_secs(2));
    }
}

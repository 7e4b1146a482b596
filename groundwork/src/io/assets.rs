//! Static assets and template sources copied into the scaffold.
//!
//! Built-in assets are compiled into the binary. A configured directory may
//! override any of them by id (the relative file name inside that directory).

use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use crate::error::StepError;

/// Lookup of asset bytes by id.
pub trait AssetSource {
    /// Returns `Ok(None)` when no asset with `id` exists.
    fn load(&self, id: &str) -> Result<Option<Vec<u8>>, StepError>;

    fn require(&self, id: &str) -> Result<Vec<u8>, StepError> {
        self.load(id)?.ok_or_else(|| StepError::FileSourceMissing {
            asset: id.to_string(),
        })
    }
}

macro_rules! embedded {
    ($($id:literal),* $(,)?) => {
        &[$(($id, include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/assets/", $id)))),*]
    };
}

const EMBEDDED: &[(&str, &str)] = embedded![
    "README.md.j2",
    "gitignore",
    "Gemfile.j2",
    "bin_setup.j2",
    "bin_deploy.j2",
    "dev.rake",
    "smtp.rb",
    "secrets.yml",
    "database.yml.j2",
    "puma.rb",
    "Procfile",
    "rack_mini_profiler.rb",
    "errors.rb",
    "locales_it.yml.j2",
    "spec_helper.rb",
    "rails_helper.rb",
    "env",
    "factory_bot_rspec.rb",
    "action_mailer_rspec.rb",
    "layout.html.slim.j2",
    "_flashes.html.slim",
    "flashes_helper.rb",
    "circle.yml.j2",
    "rubocop.rake",
    "rubocop.yml",
    "rubocop_todo.yml",
    "brakeman.rake",
    "bundler_audit.rake",
    "slim-lint.rake",
    "slim-lint.yml",
];

/// Assets built into the binary, optionally overridden from a directory.
#[derive(Debug, Clone, Default)]
pub struct Assets {
    override_dir: Option<PathBuf>,
}

impl Assets {
    pub fn embedded() -> Self {
        Self::default()
    }

    pub fn with_override_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            override_dir: Some(dir.into()),
        }
    }

    pub fn embedded_ids() -> impl Iterator<Item = &'static str> {
        EMBEDDED.iter().map(|(id, _)| *id)
    }
}

impl AssetSource for Assets {
    fn load(&self, id: &str) -> Result<Option<Vec<u8>>, StepError> {
        if let Some(dir) = &self.override_dir {
            let rel = Path::new(id);
            if rel
                .components()
                .any(|component| !matches!(component, Component::Normal(_)))
            {
                return Err(StepError::PathEscape {
                    path: rel.to_path_buf(),
                });
            }
            let path = dir.join(rel);
            match fs::read(&path) {
                Ok(bytes) => return Ok(Some(bytes)),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(StepError::io(path, err)),
            }
        }
        Ok(EMBEDDED
            .iter()
            .find(|(name, _)| *name == id)
            .map(|(_, body)| body.as_bytes().to_vec()))
    }
}

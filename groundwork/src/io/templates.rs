//! Template rendering backed by minijinja.

use std::collections::BTreeMap;

use minijinja::{Environment, UndefinedBehavior};

use crate::core::naming::{camelize, dasherize, humanize, underscore};
use crate::error::StepError;

/// Renders template sources with string bindings.
///
/// Undefined variables are errors, and trailing newlines are preserved so that
/// later anchors on the last line of a file still resolve.
pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.add_filter("dasherize", |value: String| dasherize(&value));
        env.add_filter("underscore", |value: String| underscore(&value));
        env.add_filter("humanize", |value: String| humanize(&value));
        env.add_filter("camelize", |value: String| camelize(&value));
        Self { env }
    }

    pub fn render(
        &self,
        id: &str,
        source: &str,
        bindings: &BTreeMap<String, String>,
    ) -> Result<String, StepError> {
        self.env
            .render_named_str(id, source, bindings)
            .map_err(|err| StepError::TemplateRender {
                template: id.to_string(),
                message: err.to_string(),
            })
    }
}

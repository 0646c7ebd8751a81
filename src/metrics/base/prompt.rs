use std::collections::HashSet;
use std::path::Path;

use indexmap::IndexMap;
use minijinja::{Environment, UndefinedBehavior};
use serde_json::{json, Value};

use crate::core::PromptError;
use crate::llm::RenderedPrompt;
use crate::metrics::base::arg::Arg;
use crate::metrics::base::response::ResponseFormat;

/// A system + user prompt pair with named, typed placeholders.
///
/// Placeholders use minijinja `{{ name }}` syntax. The declared argument
/// schema must exactly cover the undeclared template variables; rendering
/// with a missing required argument fails with [`PromptError`].
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    system_prompt: String,
    user_prompt: String,
    args: IndexMap<String, Arg>,
}

impl PromptTemplate {
    pub fn new(
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        args: Option<IndexMap<String, Arg>>,
    ) -> Result<Self, PromptError> {
        let system_prompt = system_prompt.into();
        let user_prompt = user_prompt.into();
        if system_prompt.is_empty() {
            return Err(PromptError::EmptySystemPrompt);
        }
        if user_prompt.is_empty() {
            return Err(PromptError::EmptyUserPrompt);
        }

        let mut vars = template_vars(&system_prompt)?;
        vars.extend(template_vars(&user_prompt)?);
        let args = match args {
            Some(args) => args,
            None => {
                let mut sorted: Vec<_> = vars.iter().cloned().collect();
                sorted.sort();
                sorted.into_iter().map(|v| (v, Arg::default())).collect()
            }
        };

        let declared: HashSet<String> = args.keys().cloned().collect();
        let mut missing: Vec<String> = vars.difference(&declared).cloned().collect();
        if !missing.is_empty() {
            missing.sort();
            return Err(PromptError::MissingArgs { names: missing });
        }
        let mut extra: Vec<String> = declared.difference(&vars).cloned().collect();
        if !extra.is_empty() {
            extra.sort();
            return Err(PromptError::ExtraArgs { names: extra });
        }

        Ok(Self {
            system_prompt,
            user_prompt,
            args,
        })
    }

    pub fn from_files(
        system_prompt_path: impl AsRef<Path>,
        user_prompt_path: impl AsRef<Path>,
        args: Option<IndexMap<String, Arg>>,
    ) -> anyhow::Result<Self> {
        let system = std::fs::read_to_string(system_prompt_path)?;
        let user = std::fs::read_to_string(user_prompt_path)?;
        Ok(Self::new(system, user, args)?)
    }

    pub fn args(&self) -> &IndexMap<String, Arg> {
        &self.args
    }

    /// Placeholder names, i.e. what the runner must supply to render.
    pub fn identifiers(&self) -> Vec<String> {
        self.args.keys().cloned().collect()
    }

    pub fn render(&self, kwargs: &IndexMap<String, Value>) -> Result<RenderedPrompt, PromptError> {
        let mut context = IndexMap::new();
        for (name, arg) in &self.args {
            match kwargs.get(name) {
                Some(value) => {
                    context.insert(name.clone(), value.clone());
                }
                None => match (&arg.default, arg.is_required) {
                    (Some(default), _) => {
                        context.insert(name.clone(), default.clone());
                    }
                    (None, false) => {
                        context.insert(name.clone(), Value::Null);
                    }
                    (None, true) => {
                        return Err(PromptError::MissingRequired { name: name.clone() })
                    }
                },
            }
        }
        Ok(RenderedPrompt {
            system_prompt: render_str(&self.system_prompt, &context)?,
            user_prompt: render_str(&self.user_prompt, &context)?,
        })
    }

    /// Stable dict form used on disk and over the wire.
    pub fn serialize(&self) -> Value {
        json!({
            "system_prompt": self.system_prompt,
            "user_prompt": { "format": "jinja", "template": self.user_prompt },
            "args": self.args,
        })
    }

    pub fn deserialize(data: &Value) -> Result<Self, PromptError> {
        let system_prompt = data
            .get("system_prompt")
            .and_then(Value::as_str)
            .ok_or_else(|| PromptError::InvalidSerialized("missing system_prompt".into()))?;
        let user = data
            .get("user_prompt")
            .ok_or_else(|| PromptError::InvalidSerialized("missing user_prompt".into()))?;
        if user.get("format").and_then(Value::as_str) != Some("jinja") {
            return Err(PromptError::InvalidSerialized(
                "only jinja prompts are supported".into(),
            ));
        }
        let template = user
            .get("template")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                PromptError::InvalidSerialized("user prompt must contain a template".into())
            })?;
        let args = match data.get("args") {
            Some(raw) => Some(
                serde_json::from_value::<IndexMap<String, Arg>>(raw.clone())
                    .map_err(|e| PromptError::InvalidSerialized(e.to_string()))?,
            ),
            None => None,
        };
        Self::new(system_prompt, template, args)
    }

    pub fn system_template(&self) -> &str {
        &self.system_prompt
    }

    pub fn user_template(&self) -> &str {
        &self.user_prompt
    }
}

/// A [`PromptTemplate`] plus the response format an LLM judge must follow.
#[derive(Debug, Clone)]
pub struct MetricPrompt {
    pub template: PromptTemplate,
    pub response_format: ResponseFormat,
    pub description: Option<String>,
}

impl MetricPrompt {
    pub fn new(
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        response_format: ResponseFormat,
        args: Option<IndexMap<String, Arg>>,
    ) -> Result<Self, PromptError> {
        Ok(Self {
            template: PromptTemplate::new(system_prompt, user_prompt, args)?,
            response_format,
            description: None,
        })
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn render(&self, kwargs: &IndexMap<String, Value>) -> Result<RenderedPrompt, PromptError> {
        self.template.render(kwargs)
    }

    pub fn args(&self) -> &IndexMap<String, Arg> {
        self.template.args()
    }

    pub fn serialize(&self) -> Value {
        let mut data = self.template.serialize();
        if let Some(obj) = data.as_object_mut() {
            obj.insert(
                "response_format".to_string(),
                serde_json::to_value(&self.response_format).unwrap_or(Value::Null),
            );
            obj.insert(
                "description".to_string(),
                self.description.clone().map(Value::String).unwrap_or(Value::Null),
            );
        }
        data
    }

    pub fn deserialize(data: &Value) -> Result<Self, PromptError> {
        let template = PromptTemplate::deserialize(data)?;
        let response_format = data
            .get("response_format")
            .cloned()
            .ok_or_else(|| PromptError::InvalidSerialized("missing response_format".into()))?;
        let response_format: ResponseFormat = serde_json::from_value(response_format)
            .map_err(|e| PromptError::InvalidSerialized(e.to_string()))?;
        let description = data
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Self {
            template,
            response_format,
            description,
        })
    }
}

fn environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env
}

fn template_vars(source: &str) -> Result<HashSet<String>, PromptError> {
    let env = environment();
    let template = env.template_from_str(source)?;
    Ok(template.undeclared_variables(false))
}

fn render_str(source: &str, context: &IndexMap<String, Value>) -> Result<String, PromptError> {
    let env = environment();
    let template = env.template_from_str(source)?;
    Ok(template.render(context)?)
}

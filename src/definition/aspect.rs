use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::deployment::DeploymentModel;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AdviceType {
    Around,
    Before,
    After,
    AfterReturning,
    AfterThrowing,
}

impl AdviceType {
    pub fn as_str(self) -> &'static str {
        match self {
            AdviceType::Around => "around",
            AdviceType::Before => "before",
            AdviceType::After => "after",
            AdviceType::AfterReturning => "afterReturning",
            AdviceType::AfterThrowing => "afterThrowing",
        }
    }
}

impl FromStr for AdviceType {
    type Err = Error;

    /// Accepts `afterReturning`, `after returning` and `after-returning` spellings.
    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s.chars().filter(|c| !matches!(c, ' ' | '-' | '_')).collect();
        let kind = match normalized.to_ascii_lowercase().as_str() {
            "around" => AdviceType::Around,
            "before" => AdviceType::Before,
            "after" | "afterfinally" => AdviceType::After,
            "afterreturning" => AdviceType::AfterReturning,
            "afterthrowing" => AdviceType::AfterThrowing,
            _ => return Err(Error::definition(s, "unknown advice type")),
        };
        Ok(kind)
    }
}

impl fmt::Display for AdviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PointcutDefinition {
    pub name: String,
    pub expression: String,
}

impl PointcutDefinition {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self { name: name.into(), expression: expression.into() }
    }
}

/// One advice binding. The same advice name may be bound more than once.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AdviceDefinition {
    pub name: String,
    pub kind: AdviceType,
    /// Pointcut name or inline expression.
    pub expression: String,
    pub aspect_name: String,
    /// Advice method signature on the aspect class, if different from `name`.
    pub method: Option<String>,
    /// Exception type pattern for `AfterThrowing`.
    pub type_filter: Option<String>,
}

impl AdviceDefinition {
    pub fn new(name: impl Into<String>, kind: AdviceType, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            expression: expression.into(),
            aspect_name: String::new(),
            method: None,
            type_filter: None,
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_type_filter(mut self, filter: impl Into<String>) -> Self {
        self.type_filter = Some(filter.into());
        self
    }

    /// `aspect.advice`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.aspect_name, self.name)
    }
}

/// Interfaces mixed into every class matched by `expression`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IntroductionDefinition {
    pub name: String,
    pub interfaces: Vec<String>,
    pub expression: String,
}

impl IntroductionDefinition {
    pub fn new<I, S>(name: impl Into<String>, expression: impl Into<String>, interfaces: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let interfaces: Vec<String> = interfaces.into_iter().map(Into::into).collect();
        if interfaces.is_empty() {
            return Err(Error::definition(name, "introduction names no interface"));
        }
        if interfaces.iter().any(|i| i.trim().is_empty()) {
            return Err(Error::definition(name, "introduction references an empty interface name"));
        }
        Ok(Self { name, interfaces, expression: expression.into() })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AspectDefinition {
    pub name: String,
    pub class_name: String,
    pub deployment_model: DeploymentModel,
    pub pointcuts: Vec<PointcutDefinition>,
    pub advices: Vec<AdviceDefinition>,
    pub introductions: Vec<IntroductionDefinition>,
    pub parameters: BTreeMap<String, String>,
}

impl AspectDefinition {
    pub fn new(name: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class_name: class_name.into(),
            deployment_model: DeploymentModel::default(),
            pointcuts: Vec::new(),
            advices: Vec::new(),
            introductions: Vec::new(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_deployment_model(mut self, model: DeploymentModel) -> Self {
        self.deployment_model = model;
        self
    }

    pub fn with_pointcut(mut self, name: impl Into<String>, expression: impl Into<String>) -> Self {
        self.add_pointcut(PointcutDefinition::new(name, expression));
        self
    }

    pub fn with_advice(mut self, advice: AdviceDefinition) -> Self {
        self.add_advice(advice);
        self
    }

    pub fn with_introduction(mut self, introduction: IntroductionDefinition) -> Self {
        self.introductions.push(introduction);
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// A pointcut with an existing name is replaced.
    pub fn add_pointcut(&mut self, pointcut: PointcutDefinition) {
        match self.pointcuts.iter_mut().find(|p| p.name == pointcut.name) {
            Some(existing) => *existing = pointcut,
            None => self.pointcuts.push(pointcut),
        }
    }

    pub fn add_advice(&mut self, mut advice: AdviceDefinition) {
        advice.aspect_name = self.name.clone();
        self.advices.push(advice);
    }

    pub fn pointcut(&self, name: &str) -> Option<&PointcutDefinition> {
        self.pointcuts.iter().find(|p| p.name == name)
    }

    /// Every binding of the advice called `name`.
    pub fn advices_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a AdviceDefinition> + 'a {
        self.advices.iter().filter(move |a| a.name == name)
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }
}

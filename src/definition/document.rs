//! Serde schema for definition sources.
//!
//! The schema is format-neutral: any serde format can carry it. It mirrors the
//! declarative layout of a definition file: systems hold aspects, aspects hold
//! pointcuts, advices and introductions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::aspect::{AdviceDefinition, AspectDefinition, IntroductionDefinition, PointcutDefinition};
use super::system::{DefinitionKind, SystemDefinition};
use crate::error::{Error, Result};
use crate::pattern::Abbreviations;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionDocument {
    #[serde(default)]
    pub systems: Vec<SystemDocument>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemDocument {
    pub id: String,
    #[serde(default)]
    pub kind: DefinitionKind,
    #[serde(default)]
    pub abbreviations: BTreeMap<String, String>,
    #[serde(default)]
    pub pointcuts: Vec<PointcutDocument>,
    #[serde(default)]
    pub aspects: Vec<AspectDocument>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AspectDocument {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "class")]
    pub class_name: String,
    #[serde(default)]
    pub deployment_model: Option<String>,
    #[serde(default)]
    pub pointcuts: Vec<PointcutDocument>,
    #[serde(default)]
    pub advices: Vec<AdviceDocument>,
    #[serde(default)]
    pub introductions: Vec<IntroductionDocument>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointcutDocument {
    pub name: String,
    pub expression: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdviceDocument {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub bind_to: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub type_filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntroductionDocument {
    pub name: String,
    pub interfaces: Vec<String>,
    pub bind_to: String,
}

impl DefinitionDocument {
    /// Parse the JSON form of a definition document.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|err| Error::definition("definition document", err.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|err| Error::definition("definition document", err.to_string()))
    }

    pub fn into_definitions(self) -> Result<Vec<SystemDefinition>> {
        self.systems.into_iter().map(SystemDocument::into_definition).collect()
    }
}

impl SystemDocument {
    pub fn into_definition(self) -> Result<SystemDefinition> {
        let mut abbreviations = Abbreviations::default();
        for (short, full) in self.abbreviations {
            abbreviations.insert(short, full);
        }
        let mut system = SystemDefinition::new(self.id).with_kind(self.kind).with_abbreviations(abbreviations);
        for pointcut in self.pointcuts {
            system.add_pointcut(pointcut.name, pointcut.expression);
        }
        for aspect in self.aspects {
            let definition = aspect.into_definition(&system)?;
            system.add_aspect(definition);
        }
        Ok(system)
    }
}

impl AspectDocument {
    fn into_definition(self, system: &SystemDefinition) -> Result<AspectDefinition> {
        let name = match (system.kind(), self.name) {
            (_, Some(name)) if !name.trim().is_empty() => name,
            (DefinitionKind::Attribute, _) => self.class_name.clone(),
            (DefinitionKind::Xml, _) => {
                return Err(Error::definition(&self.class_name, "aspect element requires a name"));
            }
        };
        let model = system.deployment_model_for(self.deployment_model.as_deref());
        let mut aspect = AspectDefinition::new(name, self.class_name).with_deployment_model(model);
        aspect.parameters = self.parameters;
        for pointcut in self.pointcuts {
            aspect.add_pointcut(PointcutDefinition::new(pointcut.name, pointcut.expression));
        }
        for advice in self.advices {
            let mut definition = AdviceDefinition::new(advice.name, advice.kind.parse()?, advice.bind_to);
            definition.method = advice.method;
            definition.type_filter = advice.type_filter;
            aspect.add_advice(definition);
        }
        for introduction in self.introductions {
            aspect = aspect.with_introduction(IntroductionDefinition::new(
                introduction.name,
                introduction.bind_to,
                introduction.interfaces,
            )?);
        }
        Ok(aspect)
    }
}

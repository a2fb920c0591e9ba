//! Client classes: named expressions compiled once, evaluated per packet.

use tracing::{debug, warn};

use crate::config::Config;
use crate::context::ExpressionKind;
use crate::error::{Error, Result};
use crate::packet::{Family, Packet};
use crate::program::{Program, compile_with};

#[derive(Debug, Clone)]
pub struct ClientClass {
    name: String,
    program: Program,
}

impl ClientClass {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// True when the class test holds for `packet`.
    ///
    /// An evaluation error counts as no match and is logged.
    pub fn matches(&self, packet: &Packet) -> bool {
        match self.program.evaluate_bool(packet) {
            Ok(verdict) => verdict,
            Err(error) => {
                warn!("Class {} failed to evaluate: {}", self.name, error);
                false
            }
        }
    }
}

/// The compiled class table of a [`Config`].
///
/// Immutable once built; share it between tasks with an `Arc`.
#[derive(Debug, Clone)]
pub struct ClientClasses {
    family: Family,
    classes: Vec<ClientClass>,
}

impl ClientClasses {
    /// Compiles every class test of `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first class whose test
    /// does not compile, or whose name is empty or repeated.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.check_names()?;
        let registry = config.registry()?;

        let classes = config
            .client_classes
            .iter()
            .map(|definition| {
                let program = compile_with(
                    &definition.test,
                    config.family,
                    ExpressionKind::Bool,
                    &registry,
                )
                .map_err(|error| {
                    Error::InvalidConfig(format!("class '{}': {}", definition.name, error))
                })?;
                Ok(ClientClass {
                    name: definition.name.clone(),
                    program,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!("Compiled {} client classes for {}", classes.len(), config.family);
        Ok(Self {
            family: config.family,
            classes,
        })
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClientClass> {
        self.classes.iter()
    }

    /// Names of the classes `packet` belongs to, in configuration order.
    pub fn classify(&self, packet: &Packet) -> Vec<&str> {
        if packet.family() != self.family {
            warn!(
                "Cannot classify a {} packet with {} classes",
                packet.family(),
                self.family
            );
            return Vec::new();
        }

        let matched: Vec<&str> = self
            .classes
            .iter()
            .filter(|class| class.matches(packet))
            .map(ClientClass::name)
            .collect();

        debug!("Packet matched classes: {:?}", matched);
        matched
    }
}

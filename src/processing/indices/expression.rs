// src/processing/indices/expression.rs
use std::collections::HashMap;

use crate::config::{BandRoles, Role};
use crate::error::Result;
use crate::processing::algebra::{evaluate, Binding, DegeneratePolicy, Expression};
use crate::processing::indices::IndexCalculator;
use crate::raster::{Band, Image};

/// Index defined by a formula over role symbols (`NIR`, `RED`, ...) and `eps`.
pub struct ExpressionIndex {
    expression: Expression,
    bindings: HashMap<String, Binding>,
    name: String,
}

impl ExpressionIndex {
    /// Binds every role symbol used by `formula` to its mapped band.
    ///
    /// Fails if the formula does not parse, uses an unmapped role or uses a
    /// symbol that is neither a role nor `eps`.
    pub fn new(formula: &str, roles: &BandRoles, epsilon: f64, name: &str) -> Result<Self> {
        let expression = Expression::parse(formula)?;

        let mut bindings = HashMap::new();
        bindings.insert("eps".to_string(), Binding::Constant(epsilon));
        for role in Role::ALL {
            if expression.symbols().contains(role.symbol()) {
                let band = roles.require(role)?;
                bindings.insert(role.symbol().to_string(), Binding::Band(band.to_string()));
            }
        }

        // Unit reflectance in every band; only unbound symbols can fail here.
        let sample: HashMap<String, f64> = bindings
            .iter()
            .map(|(symbol, binding)| {
                let value = match binding {
                    Binding::Constant(v) => *v,
                    Binding::Band(_) => 1.0,
                };
                (symbol.clone(), value)
            })
            .collect();
        expression.eval_scalar(&sample)?;

        Ok(Self {
            expression,
            bindings,
            name: name.to_string(),
        })
    }

    pub fn formula(&self) -> &str {
        self.expression.source()
    }
}

impl IndexCalculator for ExpressionIndex {
    fn calculate(&self, image: &Image, policy: DegeneratePolicy) -> Result<Band> {
        evaluate(image, &self.expression, &self.bindings, &self.name, policy)
    }

    fn input_bands(&self) -> Vec<&str> {
        let mut bands: Vec<&str> = self
            .bindings
            .values()
            .filter_map(|b| match b {
                Binding::Band(name) => Some(name.as_str()),
                Binding::Constant(_) => None,
            })
            .collect();
        bands.sort_unstable();
        bands
    }

    fn name(&self) -> &str {
        &self.name
    }
}

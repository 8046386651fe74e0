//! Visualization requests over a finished (or running) optimization.
//!
//! The optimizer does not draw anything itself. A [`RenderRequest`] is parsed
//! and validated up front, then dispatched to the matching method of a
//! caller-supplied [`Renderer`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use bo_types::{BoResult, OptimizerError};

use crate::search::SearchSpace;
use crate::trial::{ObjectiveDirection, Trial};

/// The closed set of supported visualizations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderKind {
    Interactive,
    Static,
    Tradeoff,
    #[serde(alias = "cv")]
    CrossValidate,
    Slice,
    Tile,
}

impl RenderKind {
    pub const ALL: [RenderKind; 6] = [
        Self::Interactive,
        Self::Static,
        Self::Tradeoff,
        Self::CrossValidate,
        Self::Slice,
        Self::Tile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interactive => "interactive",
            Self::Static => "static",
            Self::Tradeoff => "tradeoff",
            Self::CrossValidate => "cross_validate",
            Self::Slice => "slice",
            Self::Tile => "tile",
        }
    }
}

impl fmt::Display for RenderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RenderKind {
    type Err = OptimizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cv" => Ok(Self::CrossValidate),
            _ => Self::ALL
                .into_iter()
                .find(|kind| kind.as_str() == s)
                .ok_or_else(|| OptimizerError::UnsupportedRender {
                    kind: s.to_string(),
                }),
        }
    }
}

/// A render call with its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderRequest {
    Interactive,
    /// Contour of the objective over two parameters.
    Static { param_x: String, param_y: String },
    Tradeoff,
    #[serde(alias = "cv")]
    CrossValidate,
    /// Objective along a single parameter.
    Slice { param_name: String },
    Tile,
}

impl RenderRequest {
    /// Build a request for `kind`. `params` supplies the named arguments of
    /// the kinds that take any, in declaration order.
    pub fn parse(kind: &str, params: &[&str]) -> Result<Self, OptimizerError> {
        let kind: RenderKind = kind.parse()?;
        let arg = |i: usize, name: &str| -> Result<String, OptimizerError> {
            params
                .get(i)
                .map(|p| p.to_string())
                .ok_or_else(|| OptimizerError::MissingParameter {
                    name: name.to_string(),
                })
        };

        Ok(match kind {
            RenderKind::Interactive => Self::Interactive,
            RenderKind::Static => Self::Static {
                param_x: arg(0, "param_x")?,
                param_y: arg(1, "param_y")?,
            },
            RenderKind::Tradeoff => Self::Tradeoff,
            RenderKind::CrossValidate => Self::CrossValidate,
            RenderKind::Slice => Self::Slice {
                param_name: arg(0, "param_name")?,
            },
            RenderKind::Tile => Self::Tile,
        })
    }

    pub fn kind(&self) -> RenderKind {
        match self {
            Self::Interactive => RenderKind::Interactive,
            Self::Static { .. } => RenderKind::Static,
            Self::Tradeoff => RenderKind::Tradeoff,
            Self::CrossValidate => RenderKind::CrossValidate,
            Self::Slice { .. } => RenderKind::Slice,
            Self::Tile => RenderKind::Tile,
        }
    }

    /// Check that every named parameter exists in `space`.
    pub fn validate(&self, space: &SearchSpace) -> Result<(), OptimizerError> {
        let names: Vec<&str> = match self {
            Self::Static { param_x, param_y } => vec![param_x.as_str(), param_y.as_str()],
            Self::Slice { param_name } => vec![param_name.as_str()],
            _ => Vec::new(),
        };
        match names.into_iter().find(|name| !space.contains(name)) {
            Some(name) => Err(OptimizerError::MissingParameter {
                name: name.to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// One completed trial as seen by a renderer.
#[derive(Debug, Clone, Copy)]
pub struct Observation<'a> {
    pub trial: &'a Trial,
    pub value: f64,
}

/// Everything a renderer can draw from.
#[derive(Debug, Clone)]
pub struct RenderContext<'a> {
    pub space: &'a SearchSpace,
    /// Completed trials in proposal order.
    pub trials: Vec<&'a Trial>,
    pub objective_key: &'a str,
    pub direction: ObjectiveDirection,
}

impl<'a> RenderContext<'a> {
    pub fn observations(&self) -> impl Iterator<Item = Observation<'a>> + '_ {
        self.trials
            .iter()
            .filter_map(|&trial| trial.value.map(|value| Observation { trial, value }))
    }

    /// `(parameter value, objective)` pairs for one parameter.
    pub fn series(&self, param: &str) -> Vec<(f64, f64)> {
        self.observations()
            .filter_map(|obs| obs.trial.parameters.get(param).map(|&x| (x, obs.value)))
            .collect()
    }
}

/// Drawing backend. Each method handles one [`RenderKind`].
pub trait Renderer {
    fn interactive(&mut self, ctx: &RenderContext<'_>) -> BoResult<()>;

    fn contour(&mut self, ctx: &RenderContext<'_>, param_x: &str, param_y: &str) -> BoResult<()>;

    fn tradeoff(&mut self, ctx: &RenderContext<'_>) -> BoResult<()>;

    fn cross_validate(&mut self, ctx: &RenderContext<'_>) -> BoResult<()>;

    fn slice(&mut self, ctx: &RenderContext<'_>, param_name: &str) -> BoResult<()>;

    fn tile(&mut self, ctx: &RenderContext<'_>) -> BoResult<()>;
}

/// Validate `request` against the context and hand it to `renderer`.
pub fn render(
    request: &RenderRequest,
    ctx: &RenderContext<'_>,
    renderer: &mut dyn Renderer,
) -> BoResult<()> {
    request.validate(ctx.space)?;
    match request {
        RenderRequest::Interactive => renderer.interactive(ctx),
        RenderRequest::Static { param_x, param_y } => renderer.contour(ctx, param_x, param_y),
        RenderRequest::Tradeoff => renderer.tradeoff(ctx),
        RenderRequest::CrossValidate => renderer.cross_validate(ctx),
        RenderRequest::Slice { param_name } => renderer.slice(ctx, param_name),
        RenderRequest::Tile => renderer.tile(ctx),
    }
}

//! # skyline-services
//!
//! Request/response services behind the Tech Skyline learning experience:
//! structured career-roadmap generation and the simulated lab console. The
//! live voice session lives in `skyline-core`; these services are plain
//! blocking calls against the generative REST endpoint.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod console;
pub mod genai;
pub mod roadmap;

pub use console::{CommandOracle, ConsoleAction, GenAiOracle, LabConsole, LabContext, LogEntry, LogKind};
pub use genai::{GenAiClient, GenAiError, GenerateReply, GenerationOptions};
pub use roadmap::{CareerRoadmap, Lab, LearningStep, RoadmapError, RoadmapService, Timeline};

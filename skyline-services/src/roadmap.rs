//! Career roadmap generation.
//!
//! One structured `generateContent` call with a JSON response schema, parsed
//! into [`CareerRoadmap`]. Error mapping is user-facing: every failure mode
//! carries a message fit for direct display.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::genai::{GenAiClient, GenAiError, GenerationOptions};

pub const ROADMAP_MODEL: &str = "gemini-3-pro-preview";

/// Tech Skyline framework phase a learning step belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeline {
    Foundational,
    Growth,
    #[serde(rename = "Future Frontier")]
    FutureFrontier,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningStep {
    pub title: String,
    pub description: String,
    pub skills: Vec<String>,
    #[serde(default)]
    pub certifications: Vec<String>,
    pub timeline: Timeline,
    pub time_commitment: String,
    pub prerequisites: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lab {
    pub name: String,
    pub platform: String,
    pub description: String,
    /// Whether an interactive sandbox console can attach to this lab.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_live: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CareerRoadmap {
    pub goal: String,
    pub summary: String,
    pub steps: Vec<LearningStep>,
    pub labs: Vec<Lab>,
}

#[derive(Debug, thiserror::Error)]
pub enum RoadmapError {
    #[error("Our AI systems identified content that violates safety guidelines. Please refine your goal and try again.")]
    SafetyBlock,
    #[error("The AI service returned an empty roadmap. This might be a temporary issue.")]
    EmptyResponse,
    #[error("We encountered an error processing the generated roadmap data. Please try a different query.")]
    Parse,
    #[error("High traffic detected. Please wait a moment before generating another roadmap.")]
    QuotaExceeded,
    #[error("An unexpected error occurred while connecting to the Tech Skyline intelligence engine.")]
    Api(#[source] GenAiError),
}

/// Prompt for one roadmap request.
pub fn build_prompt(goal: &str, current_experience: &str) -> String {
    format!(
        r#"Generate a comprehensive assisted self-learning career roadmap for the following goal: "{goal}".
User's current experience: "{current_experience}".

The roadmap must align with Tech Skyline IT Solutions' framework (2026-2030):
- Foundational (Now-2027)
- Growth (2027-2029)
- Future Frontier (2028-2030)

For each learning step, you MUST provide:
1. A detailed title and description.
2. Specific skills to acquire.
3. Estimated time commitment (e.g., "4-6 weeks", "3 months").
4. Prerequisite knowledge required to start this specific step.
5. Relevant certifications.

For the "labs" and "courses" section, prioritize recommending specific real-world platforms:
- Cybersecurity: ISC2 (Certified in Cybersecurity - 1MCC), PortSwigger Academy, TryHackMe, SANS CyberAces, Cisco Networking Academy (NetAcad), CyberDegrees.org, OpenSecurityTraining.info.
- Cloud & AI: Google Skills Paths (https://www.skills.google/paths), IBM SkillsBuild, Google Colab.
- Programming: freeCodeCamp, Replit, CodeSandbox.
- Cloud/DevOps: Great Learning, LabEx, GitHub Codespaces.

Incorporate relevant technologies from these domains where applicable:
Cybersecurity, Cloud (AWS/Azure/GCP), DevOps/SRE, Data Engineering, IoT/Edge, Blockchain, Quantum Computing, and Enterprise Management (Oracle Primavera, Scrum, Agile)."#
    )
}

/// JSON schema constraining the model's reply to the roadmap shape.
pub fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "goal": { "type": "STRING" },
            "summary": { "type": "STRING" },
            "steps": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "title": { "type": "STRING" },
                        "description": { "type": "STRING" },
                        "skills": { "type": "ARRAY", "items": { "type": "STRING" } },
                        "certifications": { "type": "ARRAY", "items": { "type": "STRING" } },
                        "timeline": {
                            "type": "STRING",
                            "enum": ["Foundational", "Growth", "Future Frontier"]
                        },
                        "timeCommitment": { "type": "STRING" },
                        "prerequisites": { "type": "ARRAY", "items": { "type": "STRING" } }
                    },
                    "required": [
                        "title", "description", "skills", "timeline",
                        "timeCommitment", "prerequisites"
                    ]
                }
            },
            "labs": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "name": { "type": "STRING" },
                        "platform": { "type": "STRING" },
                        "description": { "type": "STRING" }
                    },
                    "required": ["name", "platform", "description"]
                }
            }
        },
        "required": ["goal", "summary", "steps", "labs"]
    })
}

pub struct RoadmapService {
    client: GenAiClient,
    model: String,
}

impl RoadmapService {
    pub fn new(client: GenAiClient) -> Self {
        Self {
            client,
            model: ROADMAP_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Generate a roadmap for `goal` given the user's stated experience.
    pub fn generate(
        &self,
        goal: &str,
        current_experience: &str,
    ) -> Result<CareerRoadmap, RoadmapError> {
        let options = GenerationOptions {
            response_mime_type: Some("application/json".into()),
            response_schema: Some(response_schema()),
            ..GenerationOptions::default()
        };

        let reply = self
            .client
            .generate_content(&self.model, &build_prompt(goal, current_experience), &options)
            .map_err(|e| match e {
                GenAiError::Empty { finish_reason }
                    if finish_reason.as_deref() == Some("SAFETY") =>
                {
                    RoadmapError::SafetyBlock
                }
                GenAiError::Empty { .. } => RoadmapError::EmptyResponse,
                GenAiError::Status(429) => RoadmapError::QuotaExceeded,
                other => RoadmapError::Api(other),
            })?;

        let roadmap = parse_roadmap(&reply.text)?;
        info!(
            goal,
            steps = roadmap.steps.len(),
            labs = roadmap.labs.len(),
            "roadmap generated"
        );
        Ok(roadmap)
    }
}

/// Parse and validate the model's JSON reply.
///
/// A structurally valid roadmap with zero learning steps is useless to the
/// caller and is reported as a parse failure.
pub fn parse_roadmap(raw: &str) -> Result<CareerRoadmap, RoadmapError> {
    let roadmap: CareerRoadmap = serde_json::from_str(raw).map_err(|e| {
        error!(error = %e, "roadmap JSON rejected");
        RoadmapError::Parse
    })?;
    if roadmap.steps.is_empty() {
        error!("roadmap missing learning steps");
        return Err(RoadmapError::Parse);
    }
    Ok(roadmap)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_roadmap_json() -> String {
        json!({
            "goal": "Cloud Security Engineer",
            "summary": "A phased path into cloud security.",
            "steps": [{
                "title": "Networking Foundations",
                "description": "Core TCP/IP and routing.",
                "skills": ["TCP/IP", "DNS"],
                "certifications": ["CCNA"],
                "timeline": "Foundational",
                "timeCommitment": "6-8 weeks",
                "prerequisites": ["Basic Linux"]
            }, {
                "title": "Quantum-Safe Cryptography",
                "description": "Post-quantum readiness.",
                "skills": ["PQC"],
                "certifications": [],
                "timeline": "Future Frontier",
                "timeCommitment": "3 months",
                "prerequisites": ["Cryptography basics"]
            }],
            "labs": [{
                "name": "VPC Hardening",
                "platform": "Google Skills Paths",
                "description": "Lock down egress rules."
            }]
        })
        .to_string()
    }

    #[test]
    fn parses_a_complete_roadmap() {
        let roadmap = parse_roadmap(&sample_roadmap_json()).expect("valid roadmap");
        assert_eq!(roadmap.steps.len(), 2);
        assert_eq!(roadmap.steps[0].timeline, Timeline::Foundational);
        assert_eq!(roadmap.steps[1].timeline, Timeline::FutureFrontier);
        assert_eq!(roadmap.labs[0].platform, "Google Skills Paths");
    }

    #[test]
    fn rejects_roadmap_without_steps() {
        let raw = json!({
            "goal": "g", "summary": "s", "steps": [], "labs": []
        })
        .to_string();
        assert!(matches!(parse_roadmap(&raw), Err(RoadmapError::Parse)));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            parse_roadmap("not json at all"),
            Err(RoadmapError::Parse)
        ));
    }

    #[test]
    fn timeline_uses_display_names_on_the_wire() {
        let json = serde_json::to_value(Timeline::FutureFrontier).unwrap();
        assert_eq!(json, "Future Frontier");
    }

    #[test]
    fn prompt_embeds_goal_and_framework_phases() {
        let prompt = build_prompt("DevOps Engineer", "two years of sysadmin work");
        assert!(prompt.contains(r#""DevOps Engineer""#));
        assert!(prompt.contains("two years of sysadmin work"));
        assert!(prompt.contains("Foundational (Now-2027)"));
        assert!(prompt.contains("Future Frontier (2028-2030)"));
    }

    #[test]
    fn schema_requires_the_roadmap_top_level_fields() {
        let schema = response_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        assert_eq!(required, vec!["goal", "summary", "steps", "labs"]);
    }
}

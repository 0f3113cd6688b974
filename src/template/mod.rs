//! Conversation templating over consolidated inference artifacts.
//!
//! Each artifact yields one "where is X" conversation per distinct
//! ground-truth category, in the order the categories first appear in the
//! artifact's `segments_info`. The human turn lists every model proposal;
//! the assistant turn lists the ground-truth boxes for that category.
//!
//! # Example
//!
//! ```ignore
//! use sam_forge::template::{AssistantRole, TemplateProjector};
//!
//! let projector = TemplateProjector::new()?.with_assistant_role(AssistantRole::Assistant);
//! let records = projector.build_dataset(&collection)?;
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tera::{Context, Tera};
use tracing::info;

use crate::aggregate::Collection;
use crate::annotations::BoundingBox;
use crate::artifact::{write_atomic, InferenceArtifact};
use crate::error::TemplateError;

/// Default human turn.
pub const QUESTION_TEMPLATE: &str =
    "Where is the {{ object_name }}? They might be at these locations {{ proposals }}";

/// Default assistant turn.
pub const ANSWER_TEMPLATE: &str = "The {{ object_name }} is at {{ boxes }}";

/// Speaker label written for the answer turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AssistantRole {
    #[default]
    Gpt4,
    Assistant,
}

impl AssistantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssistantRole::Gpt4 => "gpt4",
            AssistantRole::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for AssistantRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub from: String,
    pub value: String,
}

/// One record of the final dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub image: String,
    pub conversations: Vec<Turn>,
}

const QUESTION: &str = "question";
const ANSWER: &str = "answer";

/// Renders conversations from artifacts.
///
/// Both templates are parsed once, when the projector is built.
#[derive(Debug, Clone)]
pub struct TemplateProjector {
    tera: Tera,
    assistant_role: AssistantRole,
}

impl TemplateProjector {
    pub fn new() -> Result<Self, TemplateError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![(QUESTION, QUESTION_TEMPLATE), (ANSWER, ANSWER_TEMPLATE)])?;
        Ok(Self {
            tera,
            assistant_role: AssistantRole::default(),
        })
    }

    pub fn with_assistant_role(mut self, role: AssistantRole) -> Self {
        self.assistant_role = role;
        self
    }

    /// Overrides the question template. Available variables are
    /// `object_name` and `proposals`.
    pub fn with_question_template(mut self, template: &str) -> Result<Self, TemplateError> {
        self.tera.add_raw_template(QUESTION, template)?;
        Ok(self)
    }

    /// Overrides the answer template. Available variables are `object_name`
    /// and `boxes`.
    pub fn with_answer_template(mut self, template: &str) -> Result<Self, TemplateError> {
        self.tera.add_raw_template(ANSWER, template)?;
        Ok(self)
    }

    /// Projects one artifact into its conversation records.
    ///
    /// An artifact without ground-truth segments yields no records.
    pub fn project(
        &self,
        image: &str,
        artifact: &InferenceArtifact,
    ) -> Result<Vec<ConversationRecord>, TemplateError> {
        let proposals = artifact
            .sam_outputs
            .iter()
            .map(|r| r.bbox.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let mut records = Vec::new();
        for (object_name, boxes) in group_by_category(artifact) {
            let mut context = Context::new();
            context.insert("object_name", &object_name);
            context.insert("proposals", &proposals);
            context.insert("boxes", &join_boxes(&boxes));

            let question = self.tera.render(QUESTION, &context)?;
            let answer = self.tera.render(ANSWER, &context)?;

            records.push(ConversationRecord {
                image: image.to_string(),
                conversations: vec![
                    Turn {
                        from: "human".to_string(),
                        value: question,
                    },
                    Turn {
                        from: self.assistant_role.as_str().to_string(),
                        value: answer,
                    },
                ],
            });
        }

        Ok(records)
    }

    /// Projects every artifact of a collection, in identifier order.
    pub fn build_dataset(
        &self,
        collection: &Collection,
    ) -> Result<Vec<ConversationRecord>, TemplateError> {
        let mut dataset = Vec::new();
        for (image, artifact) in collection {
            dataset.extend(self.project(image, artifact)?);
        }
        Ok(dataset)
    }
}

/// Ground-truth boxes grouped by category name, in first-appearance order.
fn group_by_category(artifact: &InferenceArtifact) -> Vec<(String, Vec<BoundingBox>)> {
    let mut groups: Vec<(String, Vec<BoundingBox>)> = Vec::new();
    for region in &artifact.coco_annotations.segments_info {
        match groups
            .iter_mut()
            .find(|(name, _)| *name == region.category_name)
        {
            Some((_, boxes)) => boxes.push(region.bbox()),
            None => groups.push((region.category_name.clone(), vec![region.bbox()])),
        }
    }
    groups
}

/// Joins boxes in prose: `A`, `A and B`, `A, B and C`.
pub fn join_boxes(boxes: &[BoundingBox]) -> String {
    let rendered: Vec<String> = boxes.iter().map(ToString::to_string).collect();
    match rendered.split_last() {
        None => String::new(),
        Some((last, [])) => last.clone(),
        Some((last, rest)) => format!("{} and {}", rest.join(", "), last),
    }
}

/// Writes the dataset as a JSON array.
pub async fn write_dataset(path: &Path, dataset: &[ConversationRecord]) -> Result<(), TemplateError> {
    let json = serde_json::to_vec_pretty(dataset)?;
    write_atomic(path, &json).await?;
    info!(path = %path.display(), records = dataset.len(), "Wrote conversation dataset");
    Ok(())
}

//! Prompt templating and analysis request construction.
//!
//! A [`PromptTemplate`] holds the task instructions with two placeholders:
//! `{categories}` (required) receives the category enumeration verbatim and
//! `{examples}` receives the rendered few-shot exemplars. Wording variants
//! are different templates, not different code paths.

use std::path::Path;

use serde::Serialize;
use vtag_models::{AnalysisResult, CategorySet, RemoteFileHandle};

use crate::error::{GeminiError, GeminiResult};

pub const CATEGORIES_PLACEHOLDER: &str = "{categories}";
pub const EXAMPLES_PLACEHOLDER: &str = "{examples}";

const DEFAULT_TEMPLATE: &str = r#"Analyze this video comprehensively and extract the following information in JSON format.

Output Requirements:
1. **Language**: All text values must be in **Korean**.
2. **Format**: Return ONLY raw JSON. Do not wrap it in Markdown code blocks.

Fields:
1. **summary**: A 1-3 sentence summary that captures:
   - The main topic or theme of the video
   - Key activities, actions, or events shown
   - Atmosphere, mood, or notable highlights
   - Do NOT simply list dialogue or transcribe speech
   - Focus on WHAT is happening and WHY it is interesting

2. **tags**: A list of 1-4 core Korean keywords that represent the video's essence.

3. **category**: The single most relevant category selected from: [{categories}]

Few-Shot Examples:

{examples}

Now analyze the provided video and respond with a single JSON object in the format above. The summary must describe what is happening, not just what is being said."#;

/// A fixed input/output pair embedded in the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FewShotExample {
    /// Short description of the example video
    pub input: String,
    /// The answer the model should produce for it
    pub output: AnalysisResult,
}

impl FewShotExample {
    fn render(&self, index: usize) -> String {
        let output = serde_json::to_string_pretty(&self.output).unwrap_or_default();
        format!("Example {}:\nInput: {}\nOutput:\n{}", index, self.input, output)
    }
}

fn default_examples() -> Vec<FewShotExample> {
    vec![
        FewShotExample {
            input: "A video of a gamer playing League of Legends.".to_string(),
            output: AnalysisResult {
                summary: "이 영상은 리그 오브 레전드 랭크 게임 실황입니다. 스트리머가 미드 라이너로 플레이하며 팀원들과 협력해 팀파이트에서 펜타킬을 달성하는 장면이 하이라이트입니다. 극적인 역전 상황에서 뛰어난 컨트롤과 판단력으로 승리를 이끌어냅니다.".to_string(),
                tags: vec![
                    "리그오브레전드".to_string(),
                    "게임".to_string(),
                    "펜타킬".to_string(),
                    "하이라이트".to_string(),
                ],
                category: "게임".to_string(),
            },
        },
        FewShotExample {
            input: "A video teaching how to make Kimchi Stew.".to_string(),
            output: AnalysisResult {
                summary: "이 영상은 돼지고기 김치찌개를 만드는 요리 강좌입니다. 재료 손질부터 불 조절, 양념 비율까지 단계별로 자세히 설명하며 맛있게 끓이는 팁을 공유합니다. 집에서 쉽게 따라할 수 있도록 친근한 분위기로 진행됩니다.".to_string(),
                tags: vec![
                    "김치찌개".to_string(),
                    "레시피".to_string(),
                    "집밥".to_string(),
                    "간편요리".to_string(),
                ],
                category: "요리".to_string(),
            },
        },
    ]
}

/// Prompt text plus its few-shot exemplars.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
    examples: Vec<FewShotExample>,
}

impl PromptTemplate {
    /// Create a template.
    ///
    /// `text` must contain `{categories}`, and must contain `{examples}`
    /// whenever exemplars are supplied.
    pub fn new(text: impl Into<String>, examples: Vec<FewShotExample>) -> GeminiResult<Self> {
        let text = text.into();

        if !text.contains(CATEGORIES_PLACEHOLDER) {
            return Err(GeminiError::InvalidTemplate(format!(
                "missing {} placeholder",
                CATEGORIES_PLACEHOLDER
            )));
        }

        if !examples.is_empty() && !text.contains(EXAMPLES_PLACEHOLDER) {
            return Err(GeminiError::InvalidTemplate(format!(
                "examples supplied but {} placeholder is missing",
                EXAMPLES_PLACEHOLDER
            )));
        }

        Ok(Self { text, examples })
    }

    /// Load instructions from a file, keeping the built-in exemplars when
    /// the file has an `{examples}` slot.
    pub async fn from_file(path: impl AsRef<Path>) -> GeminiResult<Self> {
        let text = tokio::fs::read_to_string(path.as_ref()).await?;
        let examples = if text.contains(EXAMPLES_PLACEHOLDER) {
            default_examples()
        } else {
            Vec::new()
        };
        Self::new(text, examples)
    }

    pub fn examples(&self) -> &[FewShotExample] {
        &self.examples
    }

    /// Render the final prompt for `categories`.
    pub fn render(&self, categories: &CategorySet) -> String {
        let examples = self
            .examples
            .iter()
            .enumerate()
            .map(|(i, example)| example.render(i + 1))
            .collect::<Vec<_>>()
            .join("\n\n");

        self.text
            .replace(EXAMPLES_PLACEHOLDER, &examples)
            .replace(CATEGORIES_PLACEHOLDER, &categories.render())
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            text: DEFAULT_TEMPLATE.to_string(),
            examples: default_examples(),
        }
    }
}

/// Sampling parameters sent with every request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParams {
    pub response_mime_type: String,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            response_mime_type: "application/json".to_string(),
            temperature: 0.1,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 1000,
        }
    }
}

/// One content part of a generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestPart {
    Media { file_uri: String, mime_type: String },
    Text(String),
}

/// A ready-to-send analysis request: media part first, prompt second.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub parts: Vec<RequestPart>,
    pub generation: GenerationParams,
}

/// Builds analysis requests bound to an active remote file.
#[derive(Debug, Clone, Default)]
pub struct AnalysisRequestBuilder {
    template: PromptTemplate,
    params: GenerationParams,
}

impl AnalysisRequestBuilder {
    pub fn new(template: PromptTemplate) -> Self {
        Self {
            template,
            params: GenerationParams::default(),
        }
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn build(
        &self,
        handle: &RemoteFileHandle,
        categories: &CategorySet,
    ) -> GeminiResult<AnalysisRequest> {
        if !handle.is_active() {
            return Err(GeminiError::FileNotActive(handle.state));
        }

        Ok(AnalysisRequest {
            parts: vec![
                RequestPart::Media {
                    file_uri: handle.uri.clone(),
                    mime_type: handle.mime_type.clone(),
                },
                RequestPart::Text(self.template.render(categories)),
            ],
            generation: self.params.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vtag_models::RemoteFileState;

    fn active_handle() -> RemoteFileHandle {
        RemoteFileHandle {
            id: "files/abc".to_string(),
            uri: "https://generativelanguage.googleapis.com/v1beta/files/abc".to_string(),
            mime_type: "video/mp4".to_string(),
            state: RemoteFileState::Active,
        }
    }

    #[test]
    fn test_default_template_renders_categories_and_examples() {
        let prompt = PromptTemplate::default().render(&CategorySet::default());

        assert!(prompt.contains("[저스트채팅, 게임, 스포츠, 요리, 미술, 음악, 교육]"));
        assert!(prompt.contains("Example 1:"));
        assert!(prompt.contains("Example 2:"));
        assert!(prompt.contains("\"category\": \"요리\""));
        assert!(!prompt.contains(CATEGORIES_PLACEHOLDER));
        assert!(!prompt.contains(EXAMPLES_PLACEHOLDER));
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let template = PromptTemplate::default();
        let categories = CategorySet::default();
        assert_eq!(template.render(&categories), template.render(&categories));
    }

    #[test]
    fn test_custom_template_substitutes_verbatim() {
        let template = PromptTemplate::new("Pick one of: {categories}.", vec![]).unwrap();
        let categories = CategorySet::new(["Gaming", "Cooking"]).unwrap();
        assert_eq!(template.render(&categories), "Pick one of: Gaming, Cooking.");
    }

    #[test]
    fn test_template_validation() {
        assert!(matches!(
            PromptTemplate::new("no placeholder", vec![]),
            Err(GeminiError::InvalidTemplate(_))
        ));
        assert!(matches!(
            PromptTemplate::new("{categories}", default_examples()),
            Err(GeminiError::InvalidTemplate(_))
        ));
    }

    #[tokio::test]
    async fn test_template_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("prompt.txt");
        tokio::fs::write(&path, "Categories: {categories}\n{examples}").await.unwrap();

        let template = PromptTemplate::from_file(&path).await.unwrap();
        assert_eq!(template.examples().len(), 2);
    }

    #[test]
    fn test_build_orders_media_before_text() {
        let builder = AnalysisRequestBuilder::default();
        let request = builder.build(&active_handle(), &CategorySet::default()).unwrap();

        assert_eq!(request.parts.len(), 2);
        assert!(matches!(
            &request.parts[0],
            RequestPart::Media { mime_type, .. } if mime_type == "video/mp4"
        ));
        assert!(matches!(&request.parts[1], RequestPart::Text(_)));
        assert_eq!(request.generation, GenerationParams::default());
    }

    #[test]
    fn test_build_requires_active_file() {
        let mut handle = active_handle();
        handle.state = RemoteFileState::Processing;

        let err = AnalysisRequestBuilder::default()
            .build(&handle, &CategorySet::default())
            .unwrap_err();
        assert!(matches!(err, GeminiError::FileNotActive(RemoteFileState::Processing)));
    }

    #[test]
    fn test_generation_params_wire_names() {
        let json = serde_json::to_value(GenerationParams::default()).unwrap();
        assert_eq!(json["responseMimeType"], "application/json");
        assert_eq!(json["topK"], 40);
        assert_eq!(json["maxOutputTokens"], 1000);
    }
}

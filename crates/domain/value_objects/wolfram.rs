use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PodImage {
    pub src: String,
    pub alt: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subpod {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plaintext: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub img: Option<PodImage>,
}

/// A selectable alternate view of a pod, e.g. "Step-by-step solution".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PodState {
    pub name: String,
    pub input: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pod {
    pub title: String,
    pub subpods: Vec<Subpod>,
    pub states: Vec<PodState>,
}

/// Renders pods as `Title:` headers followed by their plaintext lines.
pub fn render_plaintext(pods: &[Pod]) -> String {
    let mut out = String::new();
    for pod in pods {
        out.push_str(&pod.title);
        out.push_str(":\n");
        for line in pod
            .subpods
            .iter()
            .filter_map(|subpod| subpod.plaintext.as_deref())
            .flat_map(str::lines)
            .map(str::trim)
            .filter(|line| !line.is_empty())
        {
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComputeRequest {
    pub input: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StepsRequest {
    pub input: Option<String>,
    pub podstate: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ComputeResponse {
    Pods {
        success: bool,
        pods: Vec<Pod>,
        result: String,
    },
    Failure {
        success: bool,
        error: String,
    },
}

impl ComputeResponse {
    pub fn pods(pods: Vec<Pod>) -> Self {
        let result = render_plaintext(&pods);
        ComputeResponse::Pods {
            success: true,
            pods,
            result,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        ComputeResponse::Failure {
            success: false,
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plaintext_rendering_lists_titles_and_lines() {
        let pods = vec![
            Pod {
                title: "Input".to_string(),
                subpods: vec![Subpod {
                    plaintext: Some("d/dx(x^2)".to_string()),
                    img: None,
                }],
                states: vec![],
            },
            Pod {
                title: "Result".to_string(),
                subpods: vec![
                    Subpod {
                        plaintext: Some("2 x\n".to_string()),
                        img: None,
                    },
                    Subpod {
                        plaintext: None,
                        img: None,
                    },
                ],
                states: vec![],
            },
        ];

        assert_eq!(render_plaintext(&pods), "Input:\nd/dx(x^2)\nResult:\n2 x\n");
    }

    #[test]
    fn failure_serializes_success_false() {
        let body = serde_json::to_value(ComputeResponse::failure("No pods returned")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "success": false, "error": "No pods returned" })
        );
    }
}

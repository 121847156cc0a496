use serde::{Deserialize, Serialize};

/// Per-token prices as reported by the catalog (decimal strings).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPricing {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub completion: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelArchitecture {
    #[serde(default)]
    pub tokenizer: String,
    #[serde(default)]
    pub modality: String,
}

/// One selectable completion model.
///
/// Entries are snapshots of remote data; any field may be empty/zero when the
/// catalog did not report it. An entry with an empty `id` is listed but cannot
/// be selected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCatalogEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub context_length: u64,
    #[serde(default)]
    pub max_completion_tokens: u64,
    #[serde(default)]
    pub pricing: ModelPricing,
    #[serde(default)]
    pub architecture: ModelArchitecture,
    /// Request parameters/capabilities the model accepts.
    #[serde(default)]
    pub supported_parameters: Vec<String>,
}

impl ModelCatalogEntry {
    /// Name for pickers, falling back to the id.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// One-line limits/pricing summary.
    pub fn summary_line(&self) -> String {
        let mut line = format!("Context: {} tokens", self.context_length);
        if self.max_completion_tokens > 0 {
            line.push_str(&format!(" ({} out)", self.max_completion_tokens));
        }
        if !self.pricing.prompt.is_empty() || !self.pricing.completion.is_empty() {
            line.push_str(&format!(
                " | Pricing: {} / {} per token",
                self.pricing.prompt, self.pricing.completion
            ));
        }
        line
    }

    pub fn supports(&self, capability: &str) -> bool {
        self.supported_parameters.iter().any(|p| p == capability)
    }
}

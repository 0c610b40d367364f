//! Execution provider parsing and diagnostics

use crate::{
    config::{BackendType, ExecutionProvider},
    error::{Result, TranslateError},
};
use serde::Serialize;

/// Information about an execution provider
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub name: String,
    pub backend_type: BackendType,
    pub execution_provider: ExecutionProvider,
    pub available: bool,
    pub description: String,
}

/// Utility for parsing and listing execution providers
pub struct ExecutionProviderManager;

impl ExecutionProviderManager {
    /// Parse execution provider string in format "backend:provider"
    ///
    /// A bare backend name selects that backend's default provider.
    ///
    /// ```rust
    /// use sign_translate::utils::ExecutionProviderManager;
    /// use sign_translate::{BackendType, ExecutionProvider};
    ///
    /// let (backend, provider) = ExecutionProviderManager::parse_provider_string("onnx:cuda").unwrap();
    /// assert_eq!((backend, provider), (BackendType::Onnx, ExecutionProvider::Cuda));
    /// ```
    pub fn parse_provider_string(provider_str: &str) -> Result<(BackendType, ExecutionProvider)> {
        let Some((backend, provider)) = provider_str.split_once(':') else {
            return match provider_str {
                "onnx" => Ok((BackendType::Onnx, ExecutionProvider::Auto)),
                "tract" => Ok((BackendType::Tract, ExecutionProvider::Cpu)),
                _ => Err(TranslateError::invalid_config(
                    "Invalid provider format. Use backend:provider (e.g., onnx:auto, tract:cpu)",
                )),
            };
        };

        match (backend, provider) {
            ("onnx", "auto") => Ok((BackendType::Onnx, ExecutionProvider::Auto)),
            ("onnx", "cpu") => Ok((BackendType::Onnx, ExecutionProvider::Cpu)),
            ("onnx", "cuda") => Ok((BackendType::Onnx, ExecutionProvider::Cuda)),
            ("onnx", "coreml") => Ok((BackendType::Onnx, ExecutionProvider::CoreMl)),
            ("onnx", other) => Err(TranslateError::invalid_config(format!(
                "Unknown ONNX provider: {other}. Supported: auto, cpu, cuda, coreml"
            ))),
            ("tract", "cpu") => Ok((BackendType::Tract, ExecutionProvider::Cpu)),
            ("tract", other) => Err(TranslateError::invalid_config(format!(
                "Unknown Tract provider: {other}. Tract only supports 'cpu'"
            ))),
            (other, _) => Err(TranslateError::invalid_config(format!(
                "Unknown backend: {other}. Supported backends: onnx, tract"
            ))),
        }
    }

    /// All provider combinations with their availability in this build
    pub fn list_all_providers() -> Vec<ProviderInfo> {
        let mut providers = Vec::new();

        #[cfg(feature = "onnx")]
        let onnx: Vec<(String, bool)> = crate::backends::OnnxBackend::list_providers()
            .into_iter()
            .map(|(name, available, _)| (name.to_lowercase(), available))
            .collect();
        #[cfg(not(feature = "onnx"))]
        let onnx: Vec<(String, bool)> = Vec::new();

        let onnx_available = |name: &str| onnx.iter().any(|(n, available)| n == name && *available);
        let suffix = if cfg!(feature = "onnx") { "" } else { " (feature disabled)" };

        for (provider, description) in [
            (ExecutionProvider::Auto, "ONNX Runtime with auto-selected provider"),
            (ExecutionProvider::Cpu, "ONNX Runtime CPU execution"),
            (ExecutionProvider::Cuda, "ONNX Runtime CUDA GPU acceleration"),
            (ExecutionProvider::CoreMl, "ONNX Runtime CoreML (Apple Silicon) acceleration"),
        ] {
            let available = match provider {
                ExecutionProvider::Auto => onnx.iter().any(|(_, available)| *available),
                other => onnx_available(&other.to_string()),
            };
            providers.push(ProviderInfo {
                name: Self::provider_to_string(BackendType::Onnx, provider),
                backend_type: BackendType::Onnx,
                execution_provider: provider,
                available,
                description: format!("{description}{suffix}"),
            });
        }

        providers.push(ProviderInfo {
            name: "tract:cpu".to_string(),
            backend_type: BackendType::Tract,
            execution_provider: ExecutionProvider::Cpu,
            available: cfg!(feature = "tract"),
            description: if cfg!(feature = "tract") {
                "Pure Rust CPU inference via Tract".to_string()
            } else {
                "Pure Rust CPU inference via Tract (feature disabled)".to_string()
            },
        });

        providers
    }

    /// Validate a provider string without keeping the result
    #[must_use]
    pub fn is_valid_provider_string(provider_str: &str) -> bool {
        Self::parse_provider_string(provider_str).is_ok()
    }

    /// Convert backend type and execution provider back to string
    #[must_use]
    pub fn provider_to_string(backend_type: BackendType, provider: ExecutionProvider) -> String {
        format!("{backend_type}:{provider}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_onnx_providers() {
        for (input, expected) in [
            ("onnx:auto", ExecutionProvider::Auto),
            ("onnx:cpu", ExecutionProvider::Cpu),
            ("onnx:cuda", ExecutionProvider::Cuda),
            ("onnx:coreml", ExecutionProvider::CoreMl),
        ] {
            let (backend, provider) = ExecutionProviderManager::parse_provider_string(input).unwrap();
            assert_eq!(backend, BackendType::Onnx);
            assert_eq!(provider, expected);
        }
    }

    #[test]
    fn test_parse_tract_providers() {
        let (backend, provider) =
            ExecutionProviderManager::parse_provider_string("tract:cpu").unwrap();
        assert_eq!(backend, BackendType::Tract);
        assert_eq!(provider, ExecutionProvider::Cpu);

        assert!(ExecutionProviderManager::parse_provider_string("tract:cuda").is_err());
        assert!(ExecutionProviderManager::parse_provider_string("tract:auto").is_err());
    }

    #[test]
    fn test_parse_backend_only_and_invalid() {
        assert_eq!(
            ExecutionProviderManager::parse_provider_string("tract").unwrap(),
            (BackendType::Tract, ExecutionProvider::Cpu)
        );
        assert!(!ExecutionProviderManager::is_valid_provider_string("invalid"));
        assert!(!ExecutionProviderManager::is_valid_provider_string("onnx:invalid"));
        assert!(!ExecutionProviderManager::is_valid_provider_string("invalid:auto"));
    }

    #[test]
    fn test_provider_to_string() {
        assert_eq!(
            ExecutionProviderManager::provider_to_string(BackendType::Onnx, ExecutionProvider::CoreMl),
            "onnx:coreml"
        );
    }

    #[test]
    fn test_list_all_providers() {
        let providers = ExecutionProviderManager::list_all_providers();
        let names: Vec<&str> = providers.iter().map(|p| p.name.as_str()).collect();
        assert!(names.contains(&"onnx:auto"));
        assert!(names.contains(&"tract:cpu"));
        for info in &providers {
            assert!(ExecutionProviderManager::is_valid_provider_string(&info.name));
        }
    }
}

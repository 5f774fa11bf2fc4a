//! Configuration management for BookMagic

use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub recognition: RecognitionConfig,
    pub database: DatabaseConfig,
    pub extraction: ExtractionConfig,
    pub autosave: AutosaveConfig,
}

/// OCR engine process and client settings
#[derive(Debug, Clone, Deserialize)]
pub struct RecognitionConfig {
    pub host: String,
    pub port: u16,
    /// Executable that runs the OCR engine
    pub program: String,
    /// Arguments passed before `--port <port>`
    pub args: Vec<String>,
    pub startup_timeout_ms: u64,
    pub health_attempts: u32,
    pub request_timeout_ms: u64,
    /// Tesseract-style language hint sent with every OCR request
    pub language_hint: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    /// Pages published one by one before the background phase starts
    pub fast_path_pages: u32,
    /// Background phase publishes when the page number is a multiple of this
    pub batch_size: u32,
    /// Trimmed text shorter than this triggers the OCR fallback
    pub min_text_chars: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutosaveConfig {
    pub debounce_ms: u64,
    pub saved_display_ms: u64,
}

impl RecognitionConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl AutosaveConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn saved_display(&self) -> Duration {
        Duration::from_millis(self.saved_display_ms)
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        RecognitionConfig {
            host: "127.0.0.1".to_string(),
            port: 5000,
            program: "python".to_string(),
            args: vec!["python/ocr_engine.py".to_string()],
            startup_timeout_ms: 30_000,
            health_attempts: 5,
            request_timeout_ms: 120_000,
            language_hint: "ara+eng".to_string(),
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        ExtractionConfig {
            fast_path_pages: 10,
            batch_size: 5,
            min_text_chars: 20,
        }
    }
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        AutosaveConfig {
            debounce_ms: 2000,
            saved_display_ms: 2000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            recognition: RecognitionConfig::default(),
            database: DatabaseConfig {
                url: "sqlite:./bookmagic.db".to_string(),
            },
            extraction: ExtractionConfig::default(),
            autosave: AutosaveConfig::default(),
        }
    }
}

/// Parse an optional variable, keeping the default when missing or malformed
fn var_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid value for {}: {:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        let recognition_defaults = RecognitionConfig::default();
        let extraction_defaults = ExtractionConfig::default();
        let autosave_defaults = AutosaveConfig::default();

        Ok(Config {
            recognition: RecognitionConfig {
                host: env::var("OCR_HOST").unwrap_or(recognition_defaults.host),
                port: var_or("OCR_PORT", recognition_defaults.port),
                program: env::var("OCR_PROGRAM").unwrap_or(recognition_defaults.program),
                args: env::var("OCR_ARGS")
                    .map(|raw| raw.split_whitespace().map(str::to_string).collect())
                    .unwrap_or(recognition_defaults.args),
                startup_timeout_ms: var_or(
                    "OCR_STARTUP_TIMEOUT_MS",
                    recognition_defaults.startup_timeout_ms,
                ),
                health_attempts: var_or("OCR_HEALTH_ATTEMPTS", recognition_defaults.health_attempts),
                request_timeout_ms: var_or(
                    "OCR_REQUEST_TIMEOUT_MS",
                    recognition_defaults.request_timeout_ms,
                ),
                language_hint: env::var("OCR_LANGUAGE_HINT")
                    .unwrap_or(recognition_defaults.language_hint),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")?,
            },
            extraction: ExtractionConfig {
                fast_path_pages: var_or(
                    "EXTRACT_FAST_PATH_PAGES",
                    extraction_defaults.fast_path_pages,
                ),
                batch_size: var_or("EXTRACT_BATCH_SIZE", extraction_defaults.batch_size).max(1),
                min_text_chars: var_or(
                    "EXTRACT_MIN_TEXT_CHARS",
                    extraction_defaults.min_text_chars,
                ),
            },
            autosave: AutosaveConfig {
                debounce_ms: var_or("AUTOSAVE_DEBOUNCE_MS", autosave_defaults.debounce_ms),
                saved_display_ms: var_or(
                    "AUTOSAVE_SAVED_DISPLAY_MS",
                    autosave_defaults.saved_display_ms,
                ),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reader_behaviour() {
        let config = Config::default();
        assert_eq!(config.extraction.fast_path_pages, 10);
        assert_eq!(config.extraction.batch_size, 5);
        assert_eq!(config.extraction.min_text_chars, 20);
        assert_eq!(config.autosave.debounce(), Duration::from_secs(2));
        assert_eq!(config.recognition.language_hint, "ara+eng");
        assert_eq!(config.recognition.base_url(), "http://127.0.0.1:5000");
    }

    #[test]
    fn test_var_or_falls_back_on_garbage() {
        env::set_var("BOOKMAGIC_TEST_PORT", "not-a-port");
        assert_eq!(var_or("BOOKMAGIC_TEST_PORT", 5000u16), 5000);
        env::set_var("BOOKMAGIC_TEST_PORT", " 5123 ");
        assert_eq!(var_or("BOOKMAGIC_TEST_PORT", 5000u16), 5123);
        env::remove_var("BOOKMAGIC_TEST_PORT");
        assert_eq!(var_or("BOOKMAGIC_TEST_PORT", 5000u16), 5000);
    }
}

use std::path::PathBuf;

use distill_core::GenerationSettings;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root data directory (~/.local/share/distill)
    pub data_dir: PathBuf,
    /// Persisted generation settings
    pub settings_file: PathBuf,
    /// Saved generation results, one JSON file per record
    pub results_dir: PathBuf,
    /// Extracted document text, `<id>.txt`
    pub texts_dir: PathBuf,
}

impl Config {
    /// Load configuration or use defaults
    pub fn load_or_default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("distill");
        Self::with_data_dir(data_dir)
    }

    /// Configuration rooted at an explicit directory
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            settings_file: data_dir.join("settings.json"),
            results_dir: data_dir.join("results"),
            texts_dir: data_dir.join("texts"),
            data_dir,
        }
    }

    /// Ensure all required directories exist
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.results_dir)?;
        std::fs::create_dir_all(&self.texts_dir)?;
        Ok(())
    }

    pub fn load_settings(&self) -> GenerationSettings {
        GenerationSettings::load(&self.settings_file)
    }

    /// Path of the extracted text for a document
    pub fn text_path(&self, document_id: i64) -> PathBuf {
        self.texts_dir.join(format!("{}.txt", document_id))
    }
}

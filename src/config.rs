use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::info;
use serde::Deserialize;

const APP_NAME: &str = "tooggls-report";

/// アプリケーションの設定。
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 集計結果の保存先。
    pub data_dir: PathBuf,
    /// 集計対象とするユーザーのメールアドレス。空の場合は全員。
    pub users: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_NAME),
            users: vec![],
        }
    }
}

impl Config {
    /// 設定ファイルを読み込む。
    ///
    /// パスが指定されていない場合は既定の場所を探し、ファイルが無ければ既定値を使う。
    /// 明示的に指定されたファイルが無い場合はエラーとする。
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match default_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;
        info!("Configuration loaded from: {}", path.display());

        Ok(config)
    }
}

/// 既定の設定ファイルのパス。
fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_NAME).join("config.json"))
}

//! Configuração do localgen carregada a partir de `localgen.toml`.
//!
//! A struct [`LocalgenConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! As variáveis de ambiente `COMFYUI_URL` e `LOCALGEN_OUTPUT_DIR` têm
//! precedência sobre o arquivo; flags da CLI têm precedência sobre ambos.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::lifecycle::ProcessLifecycle;

const DEFAULT_FILE: &str = "localgen.toml";

/// Configuração de nível superior carregada de `localgen.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalgenConfig {
    /// URL base do servidor de geração.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Diretório de saída do servidor, quando acessível localmente. Aceita `~`.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Intervalo entre consultas ao histórico. Sem valor, cada comando usa o seu.
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,

    /// Prazo total de acompanhamento de um job. Sem valor, cada comando usa o seu.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Timeout de cada requisição HTTP individual.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub server: ServerConfig,
}

/// Seção `[server]`: como encontrar, parar e iniciar o processo do servidor.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_process_pattern")]
    pub process_pattern: String,

    /// Comando de inicialização como lista de argumentos.
    #[serde(default)]
    pub launch: Vec<String>,

    #[serde(default)]
    pub workdir: Option<String>,
}

fn default_server_url() -> String {
    "http://127.0.0.1:8188".to_string()
}

fn default_output_dir() -> String {
    "~/ComfyUI/output".to_string()
}

// 10s, suficiente para um servidor local.
fn default_request_timeout_secs() -> u64 {
    10
}

fn default_process_pattern() -> String {
    "python main.py".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            process_pattern: default_process_pattern(),
            launch: Vec::new(),
            workdir: None,
        }
    }
}

impl Default for LocalgenConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            output_dir: default_output_dir(),
            poll_interval_ms: None,
            timeout_secs: None,
            request_timeout_secs: default_request_timeout_secs(),
            server: ServerConfig::default(),
        }
    }
}

impl LocalgenConfig {
    /// Carrega a configuração de `path`, ou de `localgen.toml` no diretório
    /// atual. Um caminho explícito inexistente é erro; o arquivo padrão
    /// ausente resulta nos valores padrão.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_FILE).exists() => Self::from_file(Path::new(DEFAULT_FILE))?,
            None => Self::default(),
        };

        config.apply_env(
            std::env::var("COMFYUI_URL").ok(),
            std::env::var("LOCALGEN_OUTPUT_DIR").ok(),
        );
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("invalid config in {}", path.display()))
    }

    /// Variáveis de ambiente vazias são ignoradas.
    fn apply_env(&mut self, url: Option<String>, output_dir: Option<String>) {
        if let Some(url) = url.filter(|u| !u.is_empty()) {
            self.server_url = url;
        }
        if let Some(dir) = output_dir.filter(|d| !d.is_empty()) {
            self.output_dir = dir;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == Some(0) {
            bail!("poll_interval_ms must be greater than zero");
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be greater than zero");
        }
        if !self.server_url.starts_with("http://") && !self.server_url.starts_with("https://") {
            bail!("server_url must start with http:// or https://, got {}", self.server_url);
        }
        Ok(())
    }

    /// `output_dir` com `~` expandido para `$HOME`.
    pub fn output_dir(&self) -> PathBuf {
        expand_home(&self.output_dir)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn lifecycle(&self) -> ProcessLifecycle {
        ProcessLifecycle {
            launch: self.server.launch.clone(),
            workdir: self.server.workdir.as_deref().map(expand_home),
            ..ProcessLifecycle::new(self.server.process_pattern.clone())
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    match (path.strip_prefix("~"), home) {
        (Some(""), Some(home)) => home,
        (Some(rest), Some(home)) if rest.starts_with('/') => home.join(&rest[1..]),
        _ => PathBuf::from(path),
    }
}

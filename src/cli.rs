//! Interface de linha de comando do localgen baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (image, qwen, video,
//! check) e flags globais (--config, --server, --timeout, --no-push, --json,
//! --restart-server, --stop-after, --verbose).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// localgen: gera imagens e vídeos com um servidor ComfyUI local.
#[derive(Debug, Parser)]
#[command(name = "localgen", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Arquivo de configuração (padrão: ./localgen.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// URL do servidor, sobrepõe config e COMFYUI_URL.
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// Prazo total de acompanhamento do job, em segundos.
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Não abre o canal WebSocket; acompanha só por polling.
    #[arg(long, global = true, default_value_t = false)]
    pub no_push: bool,

    /// Imprime o registro da execução em JSON.
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,

    /// Reinicia o servidor antes de submeter (requer [server] no config).
    #[arg(long, global = true, default_value_t = false)]
    pub restart_server: bool,

    /// Para o servidor ao final para liberar VRAM.
    #[arg(long, global = true, default_value_t = false)]
    pub stop_after: bool,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Opções comuns aos geradores de imagem.
#[derive(Debug, Clone, Args)]
pub struct ImageArgs {
    /// Descrição do que gerar.
    pub prompt: String,

    /// Largura (padrão 1024 no FLUX, 1328 no Qwen).
    #[arg(short = 'W', long)]
    pub width: Option<u32>,

    /// Altura (padrão 1024 no FLUX, 1328 no Qwen).
    #[arg(short = 'H', long)]
    pub height: Option<u32>,

    /// Seed; sem valor, derivada do relógio.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Arquivo de destino; sem valor, o artefato fica onde o servidor o gravou.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Checkpoint a carregar no lugar do padrão.
    #[arg(long)]
    pub checkpoint: Option<String>,

    /// LoRA adicional, `nome` ou `nome:força`.
    #[arg(long)]
    pub lora: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Gera uma imagem com FLUX.
    Image {
        #[command(flatten)]
        args: ImageArgs,

        /// Prompt negativo.
        #[arg(short, long, default_value = "")]
        negative: String,

        #[arg(short, long, default_value_t = 20)]
        steps: u32,
    },

    /// Gera uma imagem com Qwen-Image.
    Qwen {
        #[command(flatten)]
        args: ImageArgs,

        /// Prompt negativo.
        #[arg(short, long, default_value = "")]
        negative: String,

        /// Passos de amostragem (padrão 20, ou 4 com --lightning).
        #[arg(short, long)]
        steps: Option<u32>,

        /// Usa o LoRA Lightning de 4 passos.
        #[arg(short, long, default_value_t = false, conflicts_with = "lora")]
        lightning: bool,
    },

    /// Gera um vídeo com LTX.
    Video {
        #[arg(long)]
        prompt: String,

        #[arg(long, default_value = "low quality, blurry, distorted")]
        negative: String,

        /// Largura, múltiplo de 32.
        #[arg(long, default_value_t = 704)]
        width: u32,

        /// Altura, múltiplo de 32.
        #[arg(long, default_value_t = 384)]
        height: u32,

        /// Número de quadros, na forma 8k+1.
        #[arg(long, default_value_t = 25)]
        frames: u32,

        #[arg(long, default_value_t = 25.0)]
        fps: f64,

        #[arg(long, default_value_t = 20)]
        steps: u32,

        #[arg(long)]
        seed: Option<u64>,

        #[arg(long)]
        checkpoint: Option<String>,

        /// Arquivo de destino.
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Verifica servidor, modelos e diretório de saída.
    Check,
}

//! Interface de terminal do localgen: barra de progresso e saída colorida.
//!
//! Usa as crates `indicatif` para a barra de progresso e `console` para
//! estilização com cores. O [`JobProgress`] recebe os eventos do rastreador
//! e acompanha visualmente a execução de um job no terminal.

use std::path::Path;
use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::error::GenError;
use crate::orchestrator::RunRecord;
use crate::tracker::{JobStatus, ProgressSink, TrackerState};

/// Indicador visual de progresso para a execução de um job no terminal.
///
/// Mostra o estado do rastreador, o nó em execução e a razão
/// passo/total reportada pelo servidor.
pub struct JobProgress {
    // Barra de progresso do indicatif.
    pb: ProgressBar,
    // Estilo verde para mensagens de sucesso.
    green: Style,
    // Estilo amarelo para avisos (queda do canal).
    yellow: Style,
    dim: Style,
    // Com `--json` o resumo não é impresso.
    quiet: bool,
}

impl JobProgress {
    /// Inicia a barra com um rótulo para o job.
    pub fn start(label: &str) -> Self {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold} {msg} [{bar:30.cyan/blue}] {pos}/{len}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
        );
        pb.set_prefix(label.to_string());
        pb.set_message("connecting");
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
            quiet: false,
        }
    }

    /// Barra invisível e sem resumo, usada com `--json`.
    pub fn hidden() -> Self {
        Self {
            pb: ProgressBar::hidden(),
            green: Style::new().green().bold(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
            quiet: true,
        }
    }

    /// Finaliza a barra e exibe o artefato gerado em stdout.
    ///
    /// A barra fica oculta quando stderr não é um terminal; o resumo não.
    pub fn complete(&self, record: &RunRecord) {
        self.pb.finish_and_clear();
        if let Some(summary) = self.summary(record) {
            println!("{summary}");
        }
    }

    fn summary(&self, record: &RunRecord) -> Option<String> {
        if self.quiet {
            return None;
        }
        Some(format!(
            "  {} Saved {} ({}, {:.1}s)\n    {}",
            self.green.apply_to("✓"),
            record.artifact.display(),
            human_bytes(record.bytes),
            record.duration_ms as f64 / 1000.0,
            self.dim.apply_to(format!(
                "job {} · seed {} · {:?} · {} polls",
                record.job_id, record.seed, record.strategy, record.polls
            ))
        ))
    }

    /// Finaliza a barra sem mensagem; o erro é impresso por `main`.
    pub fn abandon(&self) {
        self.pb.finish_and_clear();
    }
}

impl ProgressSink for JobProgress {
    fn state_changed(&self, _from: TrackerState, to: TrackerState) {
        if to == TrackerState::ChannelLost {
            self.pb.println(format!(
                "  {} push channel unavailable, polling for status",
                self.yellow.apply_to("↻")
            ));
        }
        self.pb.set_message(to.to_string().to_lowercase());
    }

    fn progress(&self, value: u32, max: u32) {
        self.pb.set_length(u64::from(max));
        self.pb.set_position(u64::from(value));
    }

    fn status(&self, status: &JobStatus) {
        match status {
            JobStatus::Queued => self.pb.set_message("queued"),
            JobStatus::Executing { node: Some(node) } => {
                self.pb.set_message(format!("node {node}"))
            }
            JobStatus::Executing { node: None } => self.pb.set_message("executing"),
            JobStatus::Succeeded(_) | JobStatus::Failed(_) => {}
        }
    }
}

/// Imprime o registro da execução formatado em JSON.
pub fn print_record(record: &RunRecord) {
    println!(
        "{}",
        serde_json::to_string_pretty(record).unwrap_or_default()
    );
}

/// Imprime um erro fatal e, quando houver, a dica de correção.
pub fn print_error(err: &GenError) {
    let red = Style::new().red().bold();
    eprintln!("  {} {err}", red.apply_to("✗"));
    if let Some(hint) = err.hint() {
        eprintln!("    {}", Style::new().dim().apply_to(hint));
    }
}

/// Linhas do relatório de `localgen check`.
pub struct CheckReport {
    green: Style,
    red: Style,
    yellow: Style,
    failures: usize,
}

impl Default for CheckReport {
    fn default() -> Self {
        Self {
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            failures: 0,
        }
    }
}

impl CheckReport {
    pub fn ok(&self, label: &str, detail: impl std::fmt::Display) {
        println!("  {} {label}: {detail}", self.green.apply_to("✓"));
    }

    pub fn warn(&self, label: &str, detail: impl std::fmt::Display) {
        println!("  {} {label}: {detail}", self.yellow.apply_to("!"));
    }

    pub fn fail(&mut self, label: &str, detail: impl std::fmt::Display) {
        self.failures += 1;
        println!("  {} {label}: {detail}", self.red.apply_to("✗"));
    }

    pub fn failures(&self) -> usize {
        self.failures
    }
}

pub fn describe_dir(path: &Path) -> String {
    if path.is_dir() {
        format!("{} (present)", path.display())
    } else {
        format!("{} (missing)", path.display())
    }
}

pub(crate) fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

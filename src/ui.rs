//! Saída de terminal do saltdeploy: linhas de etapa e spinner.
//!
//! Usa `console` para estilização com cores e `indicatif` para o spinner
//! exibido enquanto uma chamada de rede está pendente. As linhas de
//! progresso vão para stdout; logs vão para stderr via `tracing`.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

/// Destino das mensagens de progresso de uma implantação.
pub trait Reporter {
    /// Anuncia o início de uma etapa.
    fn stage(&mut self, message: &str);
    /// Indica que uma chamada de rede está em andamento.
    fn waiting(&mut self, _message: &str) {}
    /// Encerra a espera iniciada por [`Reporter::waiting`].
    fn done_waiting(&mut self) {}
    /// Reporta o identificador do job criado pelo master.
    fn job_id(&mut self, jid: &str);
}

/// Linha reportada quando o estado foi aplicado.
pub fn job_line(jid: &str) -> String {
    format!("=> State applied, job ID: {jid}")
}

/// Reporter de terminal com cores e spinner.
pub struct ConsoleReporter {
    // Spinner ativo, se houver uma chamada pendente.
    spinner: Option<ProgressBar>,
    cyan: Style,
    green: Style,
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self {
            spinner: None,
            cyan: Style::new().cyan().bold(),
            green: Style::new().green().bold(),
        }
    }
}

impl Reporter for ConsoleReporter {
    fn stage(&mut self, message: &str) {
        self.done_waiting();
        println!("{}", self.cyan.apply_to(message));
    }

    fn waiting(&mut self, message: &str) {
        self.done_waiting();
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("  {spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        self.spinner = Some(pb);
    }

    fn done_waiting(&mut self) {
        if let Some(pb) = self.spinner.take() {
            pb.finish_and_clear();
        }
    }

    fn job_id(&mut self, jid: &str) {
        self.done_waiting();
        println!("{}", self.green.apply_to(job_line(jid)));
    }
}

impl Drop for ConsoleReporter {
    fn drop(&mut self) {
        self.done_waiting();
    }
}

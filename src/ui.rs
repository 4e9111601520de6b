use console::style;
use std::path::Path;

use crate::batch::{BatchEntry, BatchEvent, BatchSummary};
use crate::formatting::{format_elapsed, format_size, format_timestamp};

const HEADER_WIDTH: usize = 74;

/// Cabecera de una ejecución: título, raíz recorrida y estado de la verificación.
pub fn render_header(root: &Path, verify_output: bool) {
    let inner = HEADER_WIDTH - 4;
    let border = "─".repeat(HEADER_WIDTH - 2);
    let [title, root_line, verify_line] = header_lines(root, verify_output);

    println!("\n{}", style(format!("╭{}╮", border)).cyan());
    println!("{}", style(format!("│ {:<inner$} │", title)).cyan().bold());
    println!("{}", style(format!("├{}┤", border)).cyan());
    println!("{}", style(format!("│ {:<inner$} │", root_line)).cyan());
    let verify_row = style(format!("│ {:<inner$} │", verify_line));
    println!("{}", if verify_output { verify_row.cyan() } else { verify_row.yellow() });
    println!("{}\n", style(format!("╰{}╯", border)).cyan());
}

fn header_lines(root: &Path, verify_output: bool) -> [String; 3] {
    let label = "Raíz: ";
    let room = HEADER_WIDTH - 4 - label.chars().count();
    [
        "imgscrub · limpieza de metadata de imágenes".to_string(),
        format!("{}{}", label, tail_chars(&root.display().to_string(), room)),
        format!(
            "Verificación de salida: {}",
            if verify_output { "activada" } else { "desactivada" }
        ),
    ]
}

/// Conserva el final de una ruta larga, que es la parte que identifica la carpeta.
fn tail_chars(text: &str, room: usize) -> String {
    let count = text.chars().count();
    if count <= room {
        return text.to_string();
    }
    let tail: String = text.chars().skip(count - room + 1).collect();
    format!("…{}", tail)
}

/// Una línea por evento; `Processing` no imprime nada para no duplicar el resultado.
pub fn render_event(event: &BatchEvent) {
    match event {
        BatchEvent::Started { total } => {
            println!(
                "{}",
                style(format!("\n┌─ Procesando {} imágenes", total)).cyan().bold()
            );
        }
        BatchEvent::Processing { .. } => {}
        BatchEvent::Sanitized { report } => {
            let mut detail = format!(
                "{} etiquetas retiradas, {} conservadas",
                report.removed_tags.len(),
                report.retained_tags
            );
            if !report.discarded_ancillary.is_empty() {
                let bytes: usize = report.discarded_ancillary.iter().map(|e| e.size).sum();
                detail.push_str(&format!(
                    ", {} bloques auxiliares descartados ({})",
                    report.discarded_ancillary.len(),
                    format_size(bytes)
                ));
            }
            if report.color_profile_kept {
                detail.push_str(", perfil ICC conservado");
            }
            println!(
                "{} {} {}",
                style("│ ✓").green(),
                report.path.display(),
                style(format!("({})", detail)).dim()
            );
        }
        BatchEvent::Skipped { path, reason } => {
            println!(
                "{} {} {}",
                style("│ ↷").yellow(),
                path.display(),
                style(format!("(omitida: {})", reason)).dim()
            );
        }
        BatchEvent::Failed { path, kind, error } => {
            println!(
                "{} {} {}",
                style("│ ✗").red(),
                path.display(),
                style(format!("[{}] {}", kind, error)).red()
            );
        }
        BatchEvent::Finished { .. } => println!("{}", style("└─").cyan()),
    }
}

pub fn render_summary(summary: &BatchSummary) {
    println!("\n{}", style("┌─ Resumen ─").cyan().bold());
    println!(
        "{}",
        style(format!(
            "│ Inicio: {} · Duración: {}",
            format_timestamp(&summary.started_at),
            format_elapsed(&summary.started_at, &summary.finished_at)
        ))
        .dim()
    );
    println!(
        "{}",
        style(format!("│ Saneadas:  {}", summary.sanitized)).green()
    );
    println!(
        "{}",
        style(format!("│ Omitidas:  {}", summary.skipped)).yellow()
    );
    let failed = style(format!("│ Con error: {}", summary.failed));
    println!("{}", if summary.failed > 0 { failed.red() } else { failed.dim() });

    for entry in &summary.entries {
        if let BatchEntry::Failed { kind, .. } = entry {
            println!(
                "{}",
                style(format!("│   • {} ({})", entry.path().display(), kind)).red().dim()
            );
        }
    }

    println!(
        "{}\n",
        style(format!("└─ Operación completa. {} imágenes procesadas.", summary.total())).cyan()
    );
}

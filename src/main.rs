use clap::Parser;
use console::style;
use imgscrub::batch::{self, BatchSummary};
use imgscrub::config::AppConfig;
use imgscrub::ui;
use std::path::PathBuf;
use std::process;
use std::sync::mpsc;
use std::thread;
use tracing_subscriber::EnvFilter;

/// Elimina metadata identificable de todas las imágenes bajo un directorio.
#[derive(Debug, Parser)]
#[command(name = "imgscrub", version, about)]
struct Cli {
    /// Directorio raíz a recorrer
    #[arg(default_value = "static")]
    root: PathBuf,

    /// Archivo de configuración TOML
    #[arg(long, env = "IMGSCRUB_CONFIG")]
    config: Option<PathBuf>,

    /// Imprime el resumen como JSON en lugar de la salida interactiva
    #[arg(long)]
    json: bool,

    /// Reemplaza los archivos sin releer la salida
    #[arg(long)]
    no_verify: bool,

    /// Registros en formato JSON por stderr
    #[arg(long)]
    log_json: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match run(&cli) {
        Ok(summary) if summary.failed > 0 => process::exit(2),
        Ok(_) => {}
        Err(message) => {
            eprintln!("{}", style(message).red());
            process::exit(1);
        }
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("imgscrub=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(cli: &Cli) -> Result<BatchSummary, String> {
    let mut config = AppConfig::load(cli.config.as_deref()).map_err(|e| e.to_string())?;
    if cli.no_verify {
        config.sanitize.verify_output = false;
    }
    let options = config.sanitize_options();

    let files = batch::collect_image_files(&cli.root, &config.scan).map_err(|e| e.to_string())?;

    if cli.json {
        let summary = batch::run_batch(files, &options);
        let rendered = serde_json::to_string_pretty(&summary)
            .map_err(|e| format!("No se pudo serializar el resumen: {}", e))?;
        println!("{}", rendered);
        return Ok(summary);
    }

    ui::render_header(&cli.root, options.verify_output);

    let (sender, receiver) = mpsc::channel();
    let handle = thread::spawn(move || batch::run_batch_with_sender(files, &options, sender));

    for event in receiver.iter() {
        ui::render_event(&event);
    }

    let summary = handle
        .join()
        .map_err(|_| "El lote terminó de forma inesperada".to_string())?;
    ui::render_summary(&summary);
    Ok(summary)
}

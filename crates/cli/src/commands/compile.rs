use std::path::Path;
use std::process;

use lineage_core::CompileOptions;

use crate::{exit_with_schema_error, load_or_exit, report_error, OutputFormat};

pub(crate) fn cmd_compile(
    config: &Path,
    out: Option<&Path>,
    workers: Option<usize>,
    output: OutputFormat,
    quiet: bool,
) {
    let options = match workers {
        Some(0) => {
            report_error("--workers must be at least 1", output, quiet);
            process::exit(1);
        }
        Some(n) => CompileOptions { workers: n },
        None => CompileOptions::default(),
    };

    let schema = load_or_exit(config, output, quiet);
    let compilation = match lineage_core::compile(&schema, &options) {
        Ok(c) => c,
        Err(e) => exit_with_schema_error(&e, output, quiet),
    };

    let pretty = serde_json::to_string_pretty(&compilation.to_json())
        .unwrap_or_else(|e| format!("serialization error: {}", e));

    match out {
        None => println!("{}", pretty),
        Some(path) => {
            if let Err(e) = std::fs::write(path, format!("{}\n", pretty)) {
                report_error(
                    &format!("cannot write '{}': {}", path.display(), e),
                    output,
                    quiet,
                );
                process::exit(1);
            }
            if !quiet {
                match output {
                    OutputFormat::Text => println!("wrote {}", path.display()),
                    OutputFormat::Json => println!(
                        "{}",
                        serde_json::json!({ "written": path.display().to_string() })
                    ),
                }
            }
        }
    }
}

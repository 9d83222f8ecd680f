//! acta – command-line front end for acta-forge.
//!
//! Usage:
//!   acta generate <request.json> [--config cfg.json] [--out-dir DIR] [--base-dir DIR]
//!   acta normalize <input-image> <output.jpg>
//!   acta inspect <template.docx> [mapping.json]
//!
//! Set `RUST_LOG=debug` for a per-step trace.

use std::{env, fs, path::PathBuf, process};

use acta_forge::inspect::inspect_bytes;
use acta_forge::mapping::VariableMapping;
use acta_forge::normalize::ImageNormalizer;
use acta_forge::pipeline::{generate_document, GenerationRequest, GeneratorConfig};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let prog = args.first().map(String::as_str).unwrap_or("acta");

    let mut config_path: Option<PathBuf> = None;
    let mut out_dir: Option<PathBuf> = None;
    let mut base_dir: Option<PathBuf> = None;
    let mut positional: Vec<String> = Vec::new();

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => config_path = Some(flag_value(prog, arg, iter.next())),
            "--out-dir" | "-o" => out_dir = Some(flag_value(prog, arg, iter.next())),
            "--base-dir" | "-b" => base_dir = Some(flag_value(prog, arg, iter.next())),
            "--help" | "-h" => {
                print_usage(prog);
                process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown flag: {other}");
                print_usage(prog);
                process::exit(1);
            }
            value => positional.push(value.to_string()),
        }
    }

    let Some((command, rest)) = positional.split_first() else {
        eprintln!("Error: no command specified.");
        print_usage(prog);
        process::exit(1);
    };

    let result = match command.as_str() {
        "generate" => run_generate(rest, config_path, base_dir, out_dir),
        "normalize" => run_normalize(rest),
        "inspect" => run_inspect(rest),
        other => {
            eprintln!("Unknown command: {other}");
            print_usage(prog);
            process::exit(1);
        }
    };

    if let Err(e) = result {
        fail(&e);
    }
}

fn flag_value(prog: &str, flag: &str, value: Option<&String>) -> PathBuf {
    match value {
        Some(v) => PathBuf::from(v),
        None => {
            eprintln!("Missing value for {flag}");
            print_usage(prog);
            process::exit(1);
        }
    }
}

fn fail(msg: &str) -> ! {
    eprintln!("Error: {msg}");
    process::exit(1);
}

fn run_generate(
    args: &[String],
    config_path: Option<PathBuf>,
    base_dir: Option<PathBuf>,
    out_dir: Option<PathBuf>,
) -> Result<(), String> {
    let [request_path] = args else {
        return Err("generate expects exactly one <request.json>".into());
    };
    let json = fs::read_to_string(request_path).map_err(|e| format!("reading '{request_path}': {e}"))?;
    let request = GenerationRequest::from_json(&json).map_err(|e| e.to_string())?;

    // --config replaces the request's own config; the directory flags refine
    // whichever is in effect.
    let mut config = match (&config_path, &request.config) {
        (Some(p), _) => GeneratorConfig::from_json_file(p).map_err(|e| e.to_string())?,
        (None, Some(own)) => own.clone(),
        (None, None) => GeneratorConfig::default(),
    };
    if let Some(dir) = base_dir {
        config.base_dir = dir;
    }
    if let Some(dir) = out_dir {
        config.output_dir = Some(dir);
    }

    let path = generate_document(&request.template, &request.context, &config).map_err(|e| e.to_string())?;
    println!("{}", path.display());
    Ok(())
}

fn run_normalize(args: &[String]) -> Result<(), String> {
    let [input, output] = args else {
        return Err("normalize expects <input-image> <output.jpg>".into());
    };
    let bytes = fs::read(input).map_err(|e| format!("reading '{input}': {e}"))?;
    let normalized = ImageNormalizer::default().normalize(&bytes);
    fs::write(output, &normalized).map_err(|e| format!("writing '{output}': {e}"))?;
    eprintln!(
        "Wrote '{output}' ({} bytes{})",
        normalized.len(),
        if normalized == bytes { ", unchanged" } else { "" }
    );
    Ok(())
}

fn run_inspect(args: &[String]) -> Result<(), String> {
    let (template, mapping_path) = match args {
        [t] => (t, None),
        [t, m] => (t, Some(m)),
        _ => return Err("inspect expects <template.docx> [mapping.json]".into()),
    };
    let docx = fs::read(template).map_err(|e| format!("reading '{template}': {e}"))?;
    let mapping = match mapping_path {
        Some(p) => {
            let raw = fs::read_to_string(p).map_err(|e| format!("reading '{p}': {e}"))?;
            Some(VariableMapping::parse(&raw).map_err(|e| e.to_string())?)
        }
        None => None,
    };

    let report = inspect_bytes(&docx, mapping.as_ref()).map_err(|e| e.to_string())?;
    let json = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
    println!("{json}");
    if report.table_missing() {
        eprintln!("Warning: the mapped table placeholder is not in the template");
    }
    Ok(())
}

fn print_usage(prog: &str) {
    eprintln!("acta – IT asset acta generator (acta-forge)");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} generate <request.json> [--config cfg.json] [--out-dir DIR] [--base-dir DIR]");
    eprintln!("  {prog} normalize <input-image> <output.jpg>");
    eprintln!("  {prog} inspect <template.docx> [mapping.json]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  generate    Fill a template from a JSON request; prints the output path");
    eprintln!("  normalize   Orient, crop and re-encode a device photo as JPEG");
    eprintln!("  inspect     List template tokens and check them against a mapping");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  --config, -c     Generator configuration JSON (default: built-in defaults)");
    eprintln!("  --out-dir, -o    Root of the per-category output directories");
    eprintln!("  --base-dir, -b   Directory relative template paths are resolved against");
    eprintln!("  --help           Print this message");
}

//! fattura2pdf – command-line FatturaPA (XML or signed .p7m) → PDF converter.
//!
//! Usage:
//!   fattura2pdf <input> [--xsl <name>] [--styles <dir>] [--output-dir <dir>]
//!               [--title "..."] [--landscape] [--no-extract] [--html]
//!
//! The PDF is written to the current directory (or `--output-dir`) as
//! `<stem>.pdf`. A signed input also leaves `<stem>.extracted.xml` next to
//! the input file.

use std::{env, path::PathBuf, process};

use fattura_forge::pipeline::{convert_file, PageOrientation, PipelineConfig};
use fattura_forge::stylesheet::StylesheetVariant;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let prog = args.first().map(String::as_str).unwrap_or("fattura2pdf");

    let mut input_path: Option<PathBuf> = None;
    let mut config = PipelineConfig::default();

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--xsl" | "-x" => {
                let name = value_of(&mut iter, arg, prog);
                config.stylesheet = match name.parse::<StylesheetVariant>() {
                    Ok(v) => v,
                    Err(e) => {
                        eprintln!("Error: {e}");
                        process::exit(1);
                    }
                };
            }
            "--styles" => config.styles_root = Some(PathBuf::from(value_of(&mut iter, arg, prog))),
            "--output-dir" | "-o" => config.output_dir = PathBuf::from(value_of(&mut iter, arg, prog)),
            "--title" | "-t" => config.title = Some(value_of(&mut iter, arg, prog)),
            "--landscape" | "-l" => config.orientation = PageOrientation::Landscape,
            "--no-extract" => config.write_extracted = false,
            "--html" => config.write_html = true,
            "--help" | "-h" => {
                print_usage(prog);
                process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown flag: {other}");
                print_usage(prog);
                process::exit(1);
            }
            path => {
                if input_path.is_some() {
                    eprintln!("Unexpected argument: {path}");
                    print_usage(prog);
                    process::exit(1);
                }
                input_path = Some(PathBuf::from(path));
            }
        }
    }

    let input = match input_path {
        Some(p) => p,
        None => {
            eprintln!("Error: no input file specified.");
            print_usage(prog);
            process::exit(1);
        }
    };

    match convert_file(&input, &config) {
        Ok(report) => {
            if let Some(extracted) = &report.extracted_path {
                eprintln!("Extracted '{}'", extracted.display());
            }
            if let Some(html) = &report.html_path {
                eprintln!("Wrote '{}'", html.display());
            }
            eprintln!(
                "Wrote '{}' ({} bytes, {} page{})",
                report.pdf_path.display(),
                report.pdf_bytes,
                report.pages,
                if report.pages == 1 { "" } else { "s" }
            );
        }
        Err(e) => {
            log::error!("{} stage failed: {e}", e.stage());
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

/// The value following a flag, or exit with a usage error.
fn value_of<'a>(iter: &mut impl Iterator<Item = &'a String>, flag: &str, prog: &str) -> String {
    match iter.next() {
        Some(v) => v.clone(),
        None => {
            eprintln!("Error: {flag} needs a value.");
            print_usage(prog);
            process::exit(1);
        }
    }
}

fn print_usage(prog: &str) {
    let variants: Vec<&str> = StylesheetVariant::ALL.iter().map(|v| v.name()).collect();
    eprintln!("fattura2pdf – FatturaPA invoice to PDF converter");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} <input> [--xsl <name>] [--styles <dir>] [--output-dir <dir>] [--title \"...\"]");
    eprintln!("        [--landscape] [--no-extract] [--html]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <input>           Invoice XML, or a signed .p7m envelope (DER or base64)");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  --xsl, -x         Stylesheet: {} (default: sdi)", variants.join(", "));
    eprintln!("  --styles          Directory holding the .xsl files (default: $FATTURA_FORGE_STYLES or built-in)");
    eprintln!("  --output-dir, -o  Where <stem>.pdf is written (default: current directory)");
    eprintln!("  --title, -t       Document title in PDF metadata (default: input filename stem)");
    eprintln!("  --landscape       Use landscape page orientation");
    eprintln!("  --no-extract      Do not write <stem>.extracted.xml for signed inputs");
    eprintln!("  --html            Also write the intermediate <stem>.html");
    eprintln!("  --help            Print this message");
}

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use ariadne::{ColorGenerator, Label, Report, ReportKind, Source};
use clap::Parser;
use picobit_asm::asm::Assembler;
use picobit_asm::err::Error;
use picobit_asm::parse::parse_ast;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// The input assembler listing.
    input: PathBuf,

    /// The output Intel HEX file (defaults to the input with extension .hex).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print instruction counts after assembling.
    #[arg(short, long)]
    stats: bool,
}

struct SourceMetadata<'fp> {
    name: &'fp str,
    src: Source<String>,
}

fn main() -> ExitCode {
    let Args { input, output, stats } = Args::parse();

    let result = cmd_assemble(
        &input,
        output.as_deref().unwrap_or(&input.with_extension("hex")),
        stats,
    );

    match result {
        Ok(_)  => ExitCode::SUCCESS,
        Err(e) => e,
    }
}

fn cmd_assemble(input: &Path, output: &Path, stats: bool) -> Result<(), ExitCode> {
    let src = std::fs::read_to_string(input)
        .map_err(|e| report_simple(input, e))?;

    let meta = SourceMetadata {
        name: file_name(input).unwrap_or(""),
        src: Source::from(src.clone()),
    };

    let code = parse_ast(&src)
        .map_err(|e| report_error(e, &meta))?;

    let mut asm = Assembler::new();
    asm.assemble_to_hex(&code, output)
        .map_err(|e| report_error(e, &meta))?;

    if stats {
        print!("{}", asm.stats());
    }
    Ok(())
}

fn file_name(fp: &Path) -> Option<&str> {
    fp.file_name()?.to_str()
}

fn report_simple(fp: &Path, err: impl std::fmt::Display) -> ExitCode {
    eprintln!("{}: {}", fp.display(), err);
    ExitCode::FAILURE
}

fn report_error<E: Error>(err: E, meta: &SourceMetadata) -> ExitCode {
    let mut colors = ColorGenerator::new();
    let fname = meta.name;
    let offset = err.span().map_or(0, |s| s.start);

    let mut report = Report::build(ReportKind::Error, fname, offset)
        .with_message(err.to_string());
    if let Some(span) = err.span() {
        report = report.with_label({
            Label::new((fname, span))
                .with_color(colors.next())
        });
    }
    if let Some(help) = err.help() {
        report = report.with_help(help);
    }

    let _ = report.finish().eprint((fname, meta.src.clone()));
    ExitCode::FAILURE
}

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use oasis_core::{score_cohort_inputs, CohortScores, OasisConfig, VentilationOverlap};
use oasis_ingest::load_cohort_str;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "oasis-cli",
    about = "Tính điểm OASIS theo từng giờ từ dữ liệu ICU dạng JSON."
)]
struct Args {
    /// Đường dẫn tới file JSON chứa các bảng dữ liệu ICU.
    #[arg(short, long)]
    input: PathBuf,

    /// File kết quả; mặc định ghi ra stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Định dạng kết quả.
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    /// Số giờ của cửa sổ trượt.
    #[arg(long, default_value_t = 24)]
    window_hours: u32,

    /// Quy tắc xác định giờ thở máy: boundary-instants hoặc interval.
    #[arg(long, default_value = "boundary-instants")]
    vent_overlap: VentilationOverlap,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    /// Toàn bộ kết quả (dòng điểm và vấn đề dữ liệu) trong một tài liệu JSON.
    Json,
    /// Mỗi dòng điểm một đối tượng JSON.
    Ndjson,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();

    let args = Args::parse();
    let data = std::fs::read_to_string(&args.input)
        .with_context(|| format!("Không đọc được file {:?}", args.input))?;

    let config = OasisConfig {
        window_hours: args.window_hours,
        ventilation_overlap: args.vent_overlap,
    };

    let loaded = load_cohort_str(&data)?;
    if loaded.skipped_rows > 0 {
        tracing::warn!(skipped = loaded.skipped_rows, "bỏ qua các dòng dữ liệu không dùng được");
    }
    let scores = score_cohort_inputs(loaded.inputs, &config)?;

    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Không tạo được file {:?}", path))?;
            write_scores(BufWriter::new(file), &scores, args.format)?;
        }
        None => write_scores(io::stdout().lock(), &scores, args.format)?,
    }

    let summary = scores.summary();
    tracing::info!(
        stays = summary.stays,
        rows = summary.rows,
        malformed = summary.malformed_stays,
        missing_admission = summary.inconsistent_admissions,
        peak_oasis = ?summary.peak_oasis,
        "đã tính xong điểm OASIS"
    );

    Ok(())
}

fn write_scores<W: Write>(
    mut writer: W,
    scores: &CohortScores,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, scores)?;
            writeln!(writer)?;
        }
        OutputFormat::Ndjson => {
            for row in &scores.rows {
                serde_json::to_writer(&mut writer, row)?;
                writeln!(writer)?;
            }
        }
    }
    writer.flush().context("Không ghi được kết quả")?;
    Ok(())
}

use anyhow::{Context as _, Result, bail};
use clap::{Parser, Subcommand};
use ssbo_layout::{CaseConfig, CaseMetadata, CompareReport, DeviceFeatures, PreparedCase, RefDataStorage, TestStatus};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(bin_name = "ssbo-layout")]
struct Opt {
    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Lay out a case and write its shader, data and metadata.
    Generate {
        /// Case description (JSON).
        config: PathBuf,

        /// Directory the case files are written to.
        #[arg(short, long)]
        out: PathBuf,

        /// Device features (JSON); the case is only checked for support when given.
        #[arg(long)]
        device: Option<PathBuf>,

        /// `minStorageBufferOffsetAlignment` used to place instances in single buffer mode.
        #[arg(long, default_value_t = 256)]
        binding_alignment: usize,
    },
    /// Judge the buffers and pass counter a device left behind for a case.
    Compare {
        /// Case description (JSON), the same one the case was generated from.
        config: PathBuf,

        /// Buffer contents, laid out like the generated `initial.bin`.
        #[arg(short, long)]
        result: PathBuf,

        /// Final value of the pass counter.
        #[arg(short, long)]
        counter: u32,

        /// Metadata file to record the verdict in.
        #[arg(long)]
        metadata: Option<PathBuf>,

        /// Where to write the mismatch report (JSON).
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

fn init_logging(json: bool) {
    let builder = FmtSubscriber::builder().with_env_filter(EnvFilter::from_default_env());
    let result = if json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    result.expect("Failed to set global subscriber");
}

fn main() -> Result<ExitCode> {
    let opt = Opt::parse();
    init_logging(opt.json_logs);

    match opt.command {
        Command::Generate {
            config,
            out,
            device,
            binding_alignment,
        } => {
            let config = CaseConfig::from_path(&config)?;
            let device = device
                .map(|path| -> Result<DeviceFeatures> {
                    let content = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
                    Ok(serde_json::from_str(&content)?)
                })
                .transpose()?;
            let status = generate(&config, &out, device.as_ref(), binding_alignment)?;
            Ok(exit_code(status.as_ref()))
        }
        Command::Compare {
            config,
            result,
            counter,
            metadata,
            report,
        } => {
            let config = CaseConfig::from_path(&config)?;
            let bytes = fs::read(&result).with_context(|| format!("reading {}", result.display()))?;
            let (status, compare_report) = compare(&config, &bytes, counter)?;
            if let Some(path) = report {
                fs::write(&path, serde_json::to_string_pretty(&compare_report)?)
                    .with_context(|| format!("writing {}", path.display()))?;
            }
            if let Some(path) = metadata {
                let mut metadata = CaseMetadata::from_path(&path)?;
                metadata.status = Some(status.clone());
                metadata.write(&path)?;
            }
            Ok(exit_code(Some(&status)))
        }
    }
}

fn exit_code(status: Option<&TestStatus>) -> ExitCode {
    match status {
        Some(TestStatus::Fail(_)) => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    }
}

fn layout_dump(prepared: &PreparedCase) -> String {
    let mut dump = String::new();
    for block in &prepared.layout.blocks {
        writeln!(dump, "{block}").unwrap();
    }
    for var in &prepared.layout.buffer_vars {
        writeln!(dump, "{var}").unwrap();
    }
    dump
}

/// Writes the files of one case into `out`.
///
/// An unsupported case only gets its metadata, carrying the reason.
fn generate(
    config: &CaseConfig,
    out: &Path,
    device: Option<&DeviceFeatures>,
    binding_alignment: usize,
) -> Result<Option<TestStatus>> {
    fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;
    let case = config.build();

    if let Some(device) = device {
        if let Err(err) = case.check_support(device) {
            warn!(name = %case.name, %err, "case not supported");
            let mut metadata = CaseMetadata::new(&case.prepare(), binding_alignment);
            let status = TestStatus::from(err);
            metadata.status = Some(status.clone());
            metadata.write(out.join("metadata.json"))?;
            return Ok(Some(status));
        }
    }

    let prepared = case.prepare();
    let dump = layout_dump(&prepared);
    let layout_json = serde_json::to_vec_pretty(&prepared.layout)?;
    let files: [(&str, &[u8]); 5] = [
        ("layout.txt", dump.as_bytes()),
        ("layout.json", &layout_json),
        ("shader.comp", prepared.shader_source.as_bytes()),
        ("initial.bin", prepared.initial_data.as_bytes()),
        ("expected.bin", prepared.expected_data.as_bytes()),
    ];
    for (name, contents) in files {
        let path = out.join(name);
        fs::write(&path, contents).with_context(|| format!("writing {}", path.display()))?;
    }
    CaseMetadata::new(&prepared, binding_alignment).write(out.join("metadata.json"))?;

    info!(name = %prepared.case.name, out = %out.display(), "generated case");
    Ok(None)
}

fn compare(config: &CaseConfig, bytes: &[u8], counter: u32) -> Result<(TestStatus, CompareReport)> {
    let prepared = config.build().prepare();
    let Some(result) = RefDataStorage::with_contents(&prepared.sizes, bytes) else {
        bail!(
            "result is {} bytes, but case {} expects {}",
            bytes.len(),
            prepared.case.name,
            prepared.expected_data.as_bytes().len()
        );
    };

    let (status, report) = prepared.evaluate(counter, &result);
    if !report.is_ok() {
        eprint!("{report}");
    }
    info!(name = %prepared.case.name, %status, "compared result");
    Ok((status, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssbo_layout::{CaseKind, CaseOptions, LayoutFlags, Preset};

    fn config() -> CaseConfig {
        CaseConfig {
            name: "multi_basic_types".into(),
            case: CaseKind::Preset(Preset::MultiBasicTypes {
                flags_b: LayoutFlags::STD140,
                num_instances: 0,
            }),
            options: CaseOptions {
                layout: LayoutFlags::STD430,
                ..CaseOptions::default()
            },
        }
    }

    #[test]
    fn generated_expected_data_compares_clean() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(generate(&config(), dir.path(), None, 256).unwrap(), None);

        let shader = fs::read_to_string(dir.path().join("shader.comp")).unwrap();
        assert!(shader.contains("BlockA"));

        let expected = fs::read(dir.path().join("expected.bin")).unwrap();
        let (status, report) = compare(&config(), &expected, 1).unwrap();
        assert!(status.is_pass());
        assert!(report.is_ok());

        let initial = fs::read(dir.path().join("initial.bin")).unwrap();
        let (status, report) = compare(&config(), &initial, 1).unwrap();
        assert_eq!(status, TestStatus::Fail("Result comparison failed".into()));
        assert!(!report.is_ok());
        assert!(compare(&config(), &initial[1..], 1).is_err());
    }

    #[test]
    fn unsupported_case_only_writes_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config();
        config.options.use_physical_storage_buffer = true;

        let status = generate(&config, dir.path(), Some(&DeviceFeatures::default()), 256).unwrap();
        assert_eq!(
            status,
            Some(TestStatus::NotSupported("Physical storage buffer pointers not supported".into()))
        );
        assert!(!dir.path().join("shader.comp").exists());
        let metadata = CaseMetadata::from_path(dir.path().join("metadata.json")).unwrap();
        assert_eq!(metadata.status, status);
    }
}

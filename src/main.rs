use anyhow::Result;
use clap::{ArgAction, Parser};
use log::{error, info};
use std::path::PathBuf;
use std::time::Instant;

use simpairs::classifier::ClassificationModes;
use simpairs::{run_filter, FilterConfig, FilterStats};

fn parse_percent_id(s: &str) -> Result<f64, String> {
    let val: f64 = s.parse().map_err(|_| format!("Invalid number: {}", s))?;
    if !val.is_finite() {
        Err(format!("Minimum percent identity must be a finite number, got {}", s))
    } else {
        Ok(val)
    }
}

#[derive(Parser)]
#[command(name = "simpairs")]
#[command(version)]
#[command(about = "Find sequences that are very similar to each other (by default identical) in BLAST tabular output")]
#[command(long_about = r#"
simpairs - find highly similar sequence pairs in BLAST tabular output

Reads 12-column BLAST tabular output (blastall -m 8 / -outfmt 6) and copies
every line describing a pair of similar sequences to the output, verbatim and
in input order. Each unordered pair is reported once; self hits are skipped.

MODES (at least one required):
  --display-submatches            Any alignment at or above --min-percent-id
  --display-full-matches          Both sequences aligned end to end
  --display-contained-sequences   One sequence wholly contained in the other

The full-match and containment modes compare hit spans with reference protein
lengths looked up by gene name (second '|' field of each id) in --gene-db,
either a .gdb file from build_gene_db or a protein FASTA file.

EXAMPLES:
  # Identical subsequences
  simpairs --display-submatches all_vs_all.m8 identical.m8

  # Full-length and contained matches at >= 99% identity
  simpairs --min-percent-id 99 --display-full-matches \
           --display-contained-sequences --gene-db proteins.gdb all_vs_all.m8
"#)]
struct Args {
    /// BLAST tabular input (12 columns; .gz accepted, '-' for stdin)
    #[arg(value_name = "BLAST_INPUT_FILE", help_heading = "Input")]
    blast_input_file: PathBuf,

    /// Where to write matching lines [default: stdout]
    #[arg(value_name = "OUTPUT_FILE", help_heading = "Output")]
    output_file: Option<PathBuf>,

    /// Minimum percent identity for a line to be considered (values above 100 select nothing)
    #[arg(long = "min-percent-id", alias = "min_percent_id", value_name = "PERCENT",
          default_value = "100.0", value_parser = parse_percent_id, help_heading = "Filtering")]
    min_percent_id: f64,

    /// Display any alignment at or above the identity threshold
    #[arg(long = "display-submatches", alias = "display_submatches", help_heading = "Filtering")]
    display_submatches: bool,

    /// Display matches where one sequence is wholly contained in another
    #[arg(long = "display-contained-sequences", alias = "display_contained_sequences",
          help_heading = "Filtering")]
    display_contained_sequences: bool,

    /// Display matches where both sequences are aligned over their full length
    #[arg(long = "display-full-matches", help_heading = "Filtering")]
    display_full_matches: bool,

    /// Old spelling of --display-full-matches, which took a value; any non-empty value enables it
    #[arg(long = "display_full_matches", value_name = "VALUE", hide = true)]
    legacy_full_matches: Option<String>,

    /// Gene database (.gdb) or protein FASTA used to look up protein lengths
    #[arg(long = "gene-db", alias = "db_connect_string", value_name = "PATH",
          help_heading = "Database")]
    gene_db: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short = 'v', long, action = ArgAction::Count, help_heading = "Output")]
    verbose: u8,
}

impl Args {
    fn filter_config(&self) -> FilterConfig {
        FilterConfig {
            min_percent_id: self.min_percent_id,
            modes: ClassificationModes {
                submatches: self.display_submatches,
                contained_sequences: self.display_contained_sequences,
                full_matches: self.display_full_matches
                    || self.legacy_full_matches.as_deref().is_some_and(|v| !v.is_empty()),
            },
            gene_db: self.gene_db.clone(),
        }
    }
}

fn run(args: &Args) -> Result<FilterStats> {
    let start_time = Instant::now();
    let config = args.filter_config();
    let stats = run_filter(&config, &args.blast_input_file, args.output_file.as_deref())?;

    info!(
        "{} lines read: {} emitted, {} self hits, {} repeated pairs, {} below {}% identity, {} not matching",
        stats.lines,
        stats.emitted,
        stats.self_pairs,
        stats.duplicate_pairs,
        stats.below_threshold,
        config.min_percent_id,
        stats.not_hits
    );
    info!("Total time: {:.1}s", start_time.elapsed().as_secs_f64());

    Ok(stats)
}

fn main() {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(match args.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .parse_default_env()
        .init();

    if let Err(e) = run(&args) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use simpairs::FilterError;

    #[test]
    fn test_parse_percent_id() {
        assert_eq!(parse_percent_id("100.1").unwrap(), 100.1);
        assert!(parse_percent_id("abc").is_err());
        assert!(parse_percent_id("nan").is_err());
        assert!(parse_percent_id("inf").is_err());
        assert_eq!(parse_percent_id("0").unwrap(), 0.0);
    }

    #[test]
    fn test_args_to_config() {
        let args = Args::try_parse_from([
            "simpairs",
            "--min_percent_id",
            "97.5",
            "--display-contained-sequences",
            "--db_connect_string",
            "proteins.gdb",
            "hits.m8",
        ])
        .unwrap();
        let config = args.filter_config();

        assert_eq!(config.min_percent_id, 97.5);
        assert!(config.modes.contained_sequences);
        assert!(!config.modes.submatches);
        assert_eq!(config.gene_db, Some(PathBuf::from("proteins.gdb")));
        assert!(args.output_file.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["simpairs", "-vv", "in.m8", "out.m8"]).unwrap();
        assert_eq!(args.min_percent_id, 100.0);
        assert_eq!(args.verbose, 2);
        assert_eq!(args.output_file, Some(PathBuf::from("out.m8")));
        assert!(args.filter_config().validate().is_err());
    }

    #[test]
    fn test_legacy_full_matches_value() {
        let args = Args::try_parse_from([
            "simpairs",
            "--display_full_matches",
            "True",
            "--gene-db",
            "proteins.gdb",
            "in.m8",
        ])
        .unwrap();
        assert_eq!(args.blast_input_file, PathBuf::from("in.m8"));
        assert!(args.output_file.is_none());
        assert!(args.filter_config().modes.full_matches);

        let args = Args::try_parse_from(["simpairs", "--display-full-matches", "in.m8", "out.m8"]).unwrap();
        assert!(args.filter_config().modes.full_matches);
        assert_eq!(args.output_file, Some(PathBuf::from("out.m8")));

        let args = Args::try_parse_from(["simpairs", "--display-submatches", "in.m8"]).unwrap();
        assert!(!args.filter_config().modes.full_matches);
    }

    #[test]
    fn test_help_describes_options() {
        let help = Args::command().render_help().to_string();
        assert!(help.contains("BLAST tabular input"));
        assert!(help.contains("Where to write"));
        assert!(help.contains("Minimum percent identity"));
        assert!(help.contains("Display any alignment"));
        assert!(help.contains("Display matches where both"));
        assert!(help.contains("Increase log verbosity"));
        assert!(!help.contains("display_full_matches"));
    }

    #[test]
    fn test_run_reports_config_error() {
        let args = Args::try_parse_from(["simpairs", "missing.m8"]).unwrap();
        let err = run(&args).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FilterError>(),
            Some(FilterError::Configuration(_))
        ));
    }
}

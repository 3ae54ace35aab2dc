use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use crcl_dosing::{
    batch::BatchEvaluator,
    example_data::ExampleDataGenerator,
    formulary::default_formulary,
    models::*,
    output::{OutputManager, ReportFormatter},
    parser::PatientCsvParser,
    session::SessionHistory,
    CrclCalculator, DoseResolver, DosingError, Formulary, Result, TrendProjector,
};
use std::path::PathBuf;

fn patient_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("age")
            .long("age")
            .value_name("YEARS")
            .help("Patient age in years")
            .value_parser(value_parser!(i32))
            .allow_negative_numbers(true)
            .default_value("50"),
    )
    .arg(
        Arg::new("weight")
            .long("weight")
            .value_name("KG")
            .help("Patient weight in kg")
            .value_parser(value_parser!(f64))
            .allow_negative_numbers(true)
            .default_value("70.0"),
    )
    .arg(
        Arg::new("sex")
            .long("sex")
            .value_name("SEX")
            .help("Patient sex: male, female")
            .default_value("male"),
    )
}

fn drug_arg() -> Arg {
    Arg::new("drug")
        .short('d')
        .long("drug")
        .value_name("NAME")
        .help("Drug name from the formulary")
        .default_value("Meropenem")
}

fn scr_arg() -> Arg {
    Arg::new("scr")
        .long("scr")
        .value_name("MG_DL")
        .help("Serum creatinine in mg/dL")
        .value_parser(value_parser!(f64))
        .allow_negative_numbers(true)
}

fn build_cli() -> Command {
    Command::new("CrCl Dose Calculator")
        .version("1.0")
        .about("Creatinine clearance based dose adjustment and trend projection")
        .subcommand_required(true)
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("DIR")
                .help("Output directory for results")
                .default_value("./crcl_results")
                .global(true),
        )
        .arg(
            Arg::new("formulary-file")
                .short('f')
                .long("formulary")
                .value_name("FILE")
                .help("JSON formulary replacing the built-in drug table")
                .global(true),
        )
        .arg(
            Arg::new("save")
                .long("save")
                .help("Write results to the output directory")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            patient_args(
                Command::new("crcl").about("Estimate creatinine clearance (Cockcroft-Gault)"),
            )
            .arg(scr_arg().default_value("1.4")),
        )
        .subcommand(
            patient_args(Command::new("dose").about("Recommend a renally adjusted dose"))
                .arg(drug_arg())
                .arg(scr_arg().default_value("1.4")),
        )
        .subcommand(
            patient_args(
                Command::new("trend").about("Project CrCl over daily serum creatinine values"),
            )
            .arg(drug_arg())
            .arg(
                scr_arg()
                    .help("Daily serum creatinine values, day 1 first")
                    .value_delimiter(',')
                    .num_args(1..)
                    .conflicts_with("input"),
            )
            .arg(
                Arg::new("input")
                    .short('i')
                    .long("input")
                    .value_name("FILE")
                    .help("CSV with DAY,SCR columns"),
            ),
        )
        .subcommand(
            Command::new("batch")
                .about("Evaluate a cohort CSV with ID,AGE,WT,SCR,SEX,DRUG columns")
                .arg(
                    Arg::new("input")
                        .short('i')
                        .long("input")
                        .value_name("FILE")
                        .help("Cohort CSV file")
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("formulary")
                .about("Inspect the drug formulary")
                .subcommand_required(true)
                .subcommand(Command::new("list").about("List drugs alphabetically"))
                .subcommand(Command::new("validate").about("Report band coverage defects"))
                .subcommand(
                    Command::new("export")
                        .about("Write the formulary as JSON")
                        .arg(Arg::new("file").value_name("FILE").required(true)),
                ),
        )
        .subcommand(
            Command::new("generate-example")
                .about("Generate an example cohort and daily creatinine series")
                .arg(
                    Arg::new("patients")
                        .short('n')
                        .long("patients")
                        .value_name("NUMBER")
                        .value_parser(value_parser!(usize))
                        .default_value("20"),
                )
                .arg(
                    Arg::new("days")
                        .long("days")
                        .value_name("NUMBER")
                        .value_parser(value_parser!(usize))
                        .default_value("5"),
                ),
        )
}

fn main() -> Result<()> {
    env_logger::init();

    let matches = build_cli().get_matches();
    let config = create_run_config(&matches);

    let loaded;
    let formulary: &Formulary = match &config.formulary_path {
        Some(path) => {
            loaded = Formulary::load_json(path)?;
            &loaded
        }
        None => default_formulary(),
    };

    match matches.subcommand() {
        Some(("crcl", sub)) => run_crcl(sub),
        Some(("dose", sub)) => run_dose(sub, formulary, &config),
        Some(("trend", sub)) => run_trend(sub, formulary, &config),
        Some(("batch", sub)) => run_batch(sub, formulary, &config),
        Some(("formulary", sub)) => run_formulary(sub, formulary),
        Some(("generate-example", sub)) => run_generate_example(sub, formulary, &config),
        _ => Ok(()),
    }
}

fn create_run_config(matches: &ArgMatches) -> RunConfig {
    RunConfig {
        output_path: matches
            .get_one::<String>("output")
            .cloned()
            .unwrap_or_else(|| RunConfig::default().output_path),
        formulary_path: matches.get_one::<String>("formulary-file").cloned(),
        save_outputs: matches.get_flag("save"),
    }
}

fn patient_from(matches: &ArgMatches, serum_creatinine: f64) -> Result<PatientParameters> {
    Ok(PatientParameters {
        age: *matches.get_one::<i32>("age").unwrap_or(&50),
        weight: *matches.get_one::<f64>("weight").unwrap_or(&70.0),
        serum_creatinine,
        sex: matches
            .get_one::<String>("sex")
            .map_or("male", String::as_str)
            .parse()?,
    })
}

fn drug_from(matches: &ArgMatches) -> String {
    matches
        .get_one::<String>("drug")
        .cloned()
        .unwrap_or_else(|| "Meropenem".to_string())
}

fn run_crcl(matches: &ArgMatches) -> Result<()> {
    let scr = *matches.get_one::<f64>("scr").unwrap_or(&1.4);
    let params = patient_from(matches, scr)?;

    let estimate = CrclCalculator::estimate(&params)?;
    println!("{}", ReportFormatter::calculation_steps(&estimate));
    Ok(())
}

fn run_dose(matches: &ArgMatches, formulary: &Formulary, config: &RunConfig) -> Result<()> {
    let scr = *matches.get_one::<f64>("scr").unwrap_or(&1.4);
    let params = patient_from(matches, scr)?;
    let drug = drug_from(matches);

    let outcome = DoseResolver::resolve_for_patient(formulary, &params, &drug);
    let mut session = SessionHistory::new();
    let prompt = session.record_calculation(&params, &drug, &outcome);

    if let Ok((_, rec)) = &outcome {
        if let Some(warning) = ReportFormatter::contraindication_warning(rec) {
            println!("{}\n", warning);
        }
        if let Some(message) = session.messages.last() {
            println!("{}", message.content);
        }
        if let Some(prompt) = prompt {
            log::debug!("Assistant prompt: {}", prompt);
        }
    }

    // The session keeps the error message, so it is saved before the error surfaces.
    if config.save_outputs {
        let output_dir = PathBuf::from(&config.output_path);
        std::fs::create_dir_all(&output_dir)?;
        std::fs::write(
            output_dir.join("session.json"),
            serde_json::to_string_pretty(&session)?,
        )?;
        println!("\nSession saved to {}", output_dir.display());
    }
    outcome.map(|_| ())
}

fn run_trend(matches: &ArgMatches, formulary: &Formulary, config: &RunConfig) -> Result<()> {
    let series: Vec<f64> = match matches.get_one::<String>("input") {
        Some(path) => PatientCsvParser::parse_daily_creatinine(path)?,
        None => match matches.get_many::<f64>("scr") {
            Some(values) => values.copied().collect(),
            None => ExampleDataGenerator::default_daily_creatinine(5),
        },
    };
    let params = patient_from(matches, series.first().copied().unwrap_or(1.4))?;
    let drug = drug_from(matches);

    let trend = TrendProjector::project_trend(
        formulary,
        params.age,
        params.weight,
        params.sex,
        &series,
        &drug,
    )?;

    println!(
        "SrCr and CrCl Trends for {} (Age: {}, Weight: {} kg, Gender: {})",
        drug, params.age, params.weight, params.sex
    );
    println!("{:>5} {:>12} {:>14}", "Day", "SrCr (mg/dL)", "CrCl (mL/min)");
    for point in &trend.points {
        let marker = if Some(point.day) == trend.switch_day { "  <- switch" } else { "" };
        println!(
            "{:>5} {:>12.2} {:>14.2}{}",
            point.day, point.serum_creatinine, point.crcl, marker
        );
    }
    println!();

    if let Some(warning) = ReportFormatter::trend_contraindication_warning(&trend) {
        println!("{}", warning);
    }
    println!("{}", ReportFormatter::trend_summary(&trend));

    if config.save_outputs {
        OutputManager::save_trend(&trend, &config.output_path)?;
        println!("\nResults saved to {}", config.output_path);
    }
    Ok(())
}

fn run_batch(matches: &ArgMatches, formulary: &Formulary, config: &RunConfig) -> Result<()> {
    let input_path = matches
        .get_one::<String>("input")
        .map(PathBuf::from)
        .unwrap_or_default();

    println!("Input file: {}", input_path.display());
    let records = PatientCsvParser::parse_patients(&input_path)?;
    println!("Loaded {} patients", records.len());

    let start_time = std::time::Instant::now();
    let results = BatchEvaluator::evaluate(&records, formulary);
    println!(
        "Evaluation completed in {:.2} seconds",
        start_time.elapsed().as_secs_f64()
    );

    print_batch_summary(&results);

    if config.save_outputs {
        OutputManager::save_batch(&results, &config.output_path)?;
        println!("\nResults saved to {}", config.output_path);
    }
    Ok(())
}

fn print_batch_summary(results: &BatchResults) {
    let summary = &results.summary;
    println!("\n=== BATCH SUMMARY ===");
    println!("Patients evaluated: {}", summary.n_evaluated);
    if summary.n_failed > 0 {
        println!("Failed patients: {}", summary.n_failed);
        for failed in &results.failed_patients {
            println!("  {}: {}", failed.patient_id, failed.failure_reason);
        }
    }
    println!("Usual dose: {}", summary.n_usual_dose);
    println!("Adjusted dose: {}", summary.n_adjusted_dose);
    println!("No recommendation: {}", summary.n_no_recommendation);
    println!("Unknown drug (reference rules used): {}", summary.n_fallback);
    println!("Contraindication advisories: {}", summary.n_contraindication_advisories);

    if let (Some(mean), Some(min), Some(max)) =
        (summary.mean_crcl, summary.min_crcl, summary.max_crcl)
    {
        println!("\nCrCl (mL/min): mean {:.2}, min {:.2}, max {:.2}", mean, min, max);
        if let Some(std) = summary.std_crcl {
            println!("  SD {:.2}", std);
        }
    }
}

fn run_formulary(matches: &ArgMatches, formulary: &Formulary) -> Result<()> {
    match matches.subcommand() {
        Some(("list", _)) => {
            for name in formulary.sorted_names() {
                if let Some(entry) = formulary.get(name) {
                    println!(
                        "{:<26} threshold {:>5} mL/min  usual {} {} q{}h",
                        entry.name,
                        entry.crcl_threshold,
                        entry.usual_dose,
                        if entry.is_weight_based { "mg/kg" } else { "mg" },
                        entry.usual_interval
                    );
                }
            }
        }
        Some(("validate", _)) => {
            let issues = formulary.validate();
            if issues.is_empty() {
                println!("No formulary issues found ({} drugs).", formulary.len());
            }
            for issue in &issues {
                println!("{}: {:?}: {}", issue.drug_name, issue.kind, issue.detail);
            }
        }
        Some(("export", sub)) => {
            if let Some(file) = sub.get_one::<String>("file") {
                formulary.save_json(file)?;
                println!("Formulary written to {}", file);
            }
        }
        _ => {}
    }
    Ok(())
}

fn run_generate_example(
    matches: &ArgMatches,
    formulary: &Formulary,
    config: &RunConfig,
) -> Result<()> {
    let n_patients = *matches.get_one::<usize>("patients").unwrap_or(&20);
    let days = *matches.get_one::<usize>("days").unwrap_or(&5);

    let output_dir = PathBuf::from(&config.output_path);
    std::fs::create_dir_all(&output_dir)?;

    let cohort_file = output_dir.join("example_cohort.csv");
    ExampleDataGenerator::generate_cohort(&cohort_file, n_patients, formulary)?;
    println!("Generated example cohort: {}", cohort_file.display());

    let daily_file = output_dir.join("example_daily_scr.csv");
    ExampleDataGenerator::generate_daily_creatinine(&daily_file, days)?;
    println!("Generated example daily series: {}", daily_file.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_trend_accepts_comma_separated_values() {
        let matches = build_cli()
            .try_get_matches_from([
                "crcl-dosing",
                "trend",
                "--scr",
                "1.4,1.2,1.0",
                "--drug",
                "Vancomycin",
            ])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        let values: Vec<f64> = sub.get_many::<f64>("scr").unwrap().copied().collect();
        assert_eq!(values, vec![1.4, 1.2, 1.0]);
        assert_eq!(drug_from(sub), "Vancomycin");
    }

    #[test]
    fn test_global_options() {
        let matches = build_cli()
            .try_get_matches_from(["crcl-dosing", "dose", "--save", "-o", "/tmp/out"])
            .unwrap();
        let config = create_run_config(&matches);
        assert!(config.save_outputs);
        assert_eq!(config.output_path, "/tmp/out");
        assert!(config.formulary_path.is_none());
    }

    fn sub_matches(args: &[&str]) -> ArgMatches {
        let matches = build_cli().try_get_matches_from(args).unwrap();
        matches.subcommand().unwrap().1.clone()
    }

    fn quiet_config(output_path: &std::path::Path) -> RunConfig {
        RunConfig {
            output_path: output_path.display().to_string(),
            formulary_path: None,
            save_outputs: false,
        }
    }

    #[test]
    fn test_invalid_patient_input_is_an_error() {
        let sub = sub_matches(&["crcl-dosing", "crcl", "--age", "0"]);
        assert!(matches!(run_crcl(&sub), Err(e) if e.is_validation()));

        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = quiet_config(temp_dir.path());
        let sub = sub_matches(&["crcl-dosing", "dose", "--scr", "0"]);
        let result = run_dose(&sub, default_formulary(), &config);
        assert!(matches!(result, Err(e) if e.is_validation()));

        let sub = sub_matches(&["crcl-dosing", "trend", "--scr", "1.4,-1.0"]);
        let result = run_trend(&sub, default_formulary(), &config);
        assert!(matches!(result, Err(DosingError::InvalidDay { day: 2, .. })));
    }

    #[test]
    fn test_batch_writes_only_when_saving() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let cohort = temp_dir.path().join("cohort.csv");
        ExampleDataGenerator::generate_cohort(&cohort, 5, default_formulary()).unwrap();
        let cohort_arg = cohort.display().to_string();
        let sub = sub_matches(&["crcl-dosing", "batch", "-i", cohort_arg.as_str()]);

        let output_dir = temp_dir.path().join("out");
        let mut config = quiet_config(&output_dir);
        run_batch(&sub, default_formulary(), &config).unwrap();
        assert!(!output_dir.exists());

        config.save_outputs = true;
        run_batch(&sub, default_formulary(), &config).unwrap();
        assert!(output_dir.join("batch_results.csv").exists());
    }

    #[test]
    fn test_patient_args_are_shared_and_documented() {
        let cli = build_cli();
        for name in ["crcl", "dose", "trend"] {
            let sub = cli.find_subcommand(name).unwrap();
            for id in ["age", "weight", "sex"] {
                let arg = sub.get_arguments().find(|a| a.get_id() == id).unwrap();
                assert!(arg.get_help().is_some(), "{} --{} has no help", name, id);
            }
        }
    }
}

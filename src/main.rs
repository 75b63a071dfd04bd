use std::env;
use std::fs;
use std::path::Path;
use std::process;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::Value;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use eartrain::mastery::{KeyValueStore, PROGRESS_KEY};
use eartrain::pitch::PitchClass;
use eartrain::{
    generate_session, AdaptiveStore, AttemptRecord, AuthoredLibrary, ConceptKey, ContextKey,
    GeneratorConfig, MemoryStore, QuestionGenerator, ReviewFilter, ReviewStrategy, SessionRequest,
    SessionSource, TrainerError,
};

const USAGE: &str = "\
Usage: eartrain session <config.yaml> [count] [--seed N] [--progress file] [--source fresh|due|weak|authored] [--authored drills.yaml]
       eartrain review <progress.json> [due|weak]
       eartrain record <progress.json> <concept-key> <context> <correct|wrong> [response-ms]";

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries the JSON output
    let stderr_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .init();
}

fn read_file(path: &str) -> Result<String, TrainerError> {
    fs::read_to_string(path).map_err(|source| TrainerError::Io {
        path: path.into(),
        source,
    })
}

fn write_file(path: &str, contents: &str) -> Result<(), TrainerError> {
    fs::write(path, contents).map_err(|source| TrainerError::Io {
        path: path.into(),
        source,
    })
}

/// Progress file contents, or an empty store when the file does not exist yet.
fn load_progress(path: Option<&str>) -> Result<MemoryStore, TrainerError> {
    match path {
        Some(path) if Path::new(path).exists() => {
            let value: Value = serde_json::from_str(&read_file(path)?)?;
            Ok(MemoryStore::with_progress(value))
        }
        _ => Ok(MemoryStore::new()),
    }
}

fn usage_error(message: &str) -> TrainerError {
    TrainerError::ConfigError(format!("{}\n{}", message, USAGE))
}

fn parse_number<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T, TrainerError> {
    raw.parse()
        .map_err(|_| usage_error(&format!("{} must be a number, got '{}'", what, raw)))
}

fn run_session(args: &[String]) -> Result<(), TrainerError> {
    let mut config_path: Option<&String> = None;
    let mut count = 10usize;
    let mut seed: Option<u64> = None;
    let mut progress_path: Option<&String> = None;
    let mut authored_path: Option<&String> = None;
    let mut source = SessionSource::Fresh;

    // Parse flags
    let mut rest = args.iter();
    while let Some(arg) = rest.next() {
        let mut value = |flag: &str| {
            rest.next()
                .ok_or_else(|| usage_error(&format!("{} needs a value", flag)))
        };
        match arg.as_str() {
            "--seed" => seed = Some(parse_number(value("--seed")?, "seed")?),
            "--progress" => progress_path = Some(value("--progress")?),
            "--authored" => authored_path = Some(value("--authored")?),
            "--source" => {
                let raw = value("--source")?;
                source = SessionSource::from_str(raw)
                    .ok_or_else(|| usage_error(&format!("unknown source '{}'", raw)))?;
            }
            _ if config_path.is_none() => config_path = Some(arg),
            _ => count = parse_number(arg, "count")?,
        }
    }
    let config_path = config_path.ok_or_else(|| usage_error("missing config file"))?;

    let config = GeneratorConfig::from_yaml(&read_file(config_path)?)?;
    let library = match authored_path {
        Some(path) => AuthoredLibrary::from_yaml(&read_file(path)?)?,
        None => AuthoredLibrary::default(),
    };
    let store = AdaptiveStore::new(load_progress(progress_path.map(String::as_str))?);

    let rng = match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };
    let mut generator = QuestionGenerator::new(&config, rng).with_authored(&library);
    let start_tonic = config.tonic_pool.first().copied().unwrap_or(PitchClass::C);
    let request = SessionRequest::new(count, start_tonic).with_source(source);
    let session = generate_session(&mut generator, &request, &store.snapshot(), store.now_ms());

    println!("{}", serde_json::to_string_pretty(&session)?);
    Ok(())
}

fn run_review(args: &[String]) -> Result<(), TrainerError> {
    let path = args.first().ok_or_else(|| usage_error("missing progress file"))?;
    let strategy = match args.get(1) {
        Some(raw) => ReviewStrategy::from_str(raw)
            .ok_or_else(|| usage_error(&format!("unknown strategy '{}'", raw)))?,
        None => ReviewStrategy::Due,
    };

    let store = AdaptiveStore::new(load_progress(Some(path))?);
    let entries = store.review_entries(strategy, &ReviewFilter::default());
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

fn run_record(args: &[String]) -> Result<(), TrainerError> {
    let [path, key, context, outcome, ..] = args else {
        return Err(usage_error("record needs a progress file, concept key, context and outcome"));
    };
    let key: ConceptKey = key.parse()?;
    let context: ContextKey = context.parse()?;
    let correct = match outcome.as_str() {
        "correct" => true,
        "wrong" => false,
        other => return Err(usage_error(&format!("outcome must be correct or wrong, got '{}'", other))),
    };
    let response_ms = args
        .get(4)
        .map(|raw| parse_number::<u64>(raw, "response-ms"))
        .transpose()?;

    let mut store = AdaptiveStore::new(load_progress(Some(path))?);
    store.record_attempt(&AttemptRecord {
        concept_keys: vec![key],
        context,
        correct,
        response_ms,
    });

    let progress = store.store().read(PROGRESS_KEY).unwrap_or(Value::Null);
    write_file(path, &serde_json::to_string_pretty(&progress)?)?;
    eprintln!("Updated {}", path);
    Ok(())
}

fn main() {
    init_tracing();
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("{}", USAGE);
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "session" => run_session(&args[2..]),
        "review" => run_review(&args[2..]),
        "record" => run_record(&args[2..]),
        other => Err(usage_error(&format!("unknown command '{}'", other))),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

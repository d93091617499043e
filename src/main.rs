use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use configuration::{LogLevel, LoggingSettings, Settings};
use core_types::{
    Class, ClassId, GradeKey, GradeValue, Semester, SemesterId, Student, StudentId, Subject,
    SubjectId, UserId,
};
use database::{
    DbRepository, DirectoryStore, GradeCommand, GradeWriter, IndicatorFilter, IndicatorReader,
    connect, run_migrations,
};
use engine::{ChangeTrigger, IndicatorOrchestrator, ReportFilter, ReportingQueries};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod tables;

/// The main entry point for the Acumen performance engine.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file, if present.
    dotenvy::dotenv().ok();

    // Parse command-line arguments
    let cli = Cli::parse();

    let mut settings = configuration::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    if let Some(level) = cli.log_level {
        settings.logging.level = level;
    }
    let _log_guard = init_tracing(&settings.logging)?;

    // Initialize the database connection and run migrations
    let db_pool = connect(&settings.database)
        .await
        .context("Failed to connect to the database")?;
    run_migrations(&db_pool)
        .await
        .context("Failed to run database migrations")?;
    let repo = DbRepository::new(db_pool);

    // Execute the appropriate command
    match cli.command {
        Commands::Migrate => {
            println!("Database schema is up to date.");
            Ok(())
        }
        Commands::Directory(args) => handle_directory(args, &repo).await,
        Commands::Grade(command) => handle_grade(command, repo, &settings).await,
        Commands::Recalculate(args) => handle_recalculate(args, repo).await,
        Commands::Indicators(args) => handle_indicators(args, &repo).await,
        Commands::Report(command) => handle_report(command, repo).await,
    }
}

/// Console logging always; a daily rolling file as well when configured.
/// The returned guard flushes the file writer on drop.
fn init_tracing(settings: &LoggingSettings) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.as_str()));

    let (file_layer, guard) = match &settings.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "acumen.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Keeps student performance indicators in step with their grades.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file. Missing files are ignored.
    #[arg(long, global = true, default_value = configuration::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Overrides `logging.level`.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations.
    Migrate,
    /// Load classes, students, subjects and semesters from a JSON file.
    Directory(DirectoryArgs),
    /// Record or remove grades. Indicators are recalculated after the commit.
    #[command(subcommand)]
    Grade(GradeCommands),
    /// Recalculate indicators for one student or a whole class.
    Recalculate(RecalculateArgs),
    /// List stored indicators.
    Indicators(IndicatorArgs),
    /// Aggregated performance reports.
    #[command(subcommand)]
    Report(ReportCommands),
}

#[derive(Args)]
struct DirectoryArgs {
    /// JSON document with `classes`, `students`, `subjects` and `semesters`.
    file: PathBuf,
}

#[derive(Args)]
struct GradeTarget {
    #[arg(long)]
    student: i64,
    #[arg(long)]
    subject: i64,
    #[arg(long)]
    semester: i64,
    /// The user performing the change.
    #[arg(long)]
    actor: i64,
}

impl GradeTarget {
    fn key(&self) -> GradeKey {
        GradeKey {
            student_id: StudentId(self.student),
            subject_id: SubjectId(self.subject),
            semester_id: SemesterId(self.semester),
        }
    }
}

#[derive(Subcommand)]
enum GradeCommands {
    /// Create a grade or overwrite its value.
    Record {
        #[command(flatten)]
        target: GradeTarget,
        /// Grade on the 0-20 scale, at most two decimals.
        #[arg(long)]
        value: Decimal,
    },
    /// Delete a grade.
    Remove {
        #[command(flatten)]
        target: GradeTarget,
    },
}

#[derive(Args)]
struct RecalculateArgs {
    #[arg(long, conflicts_with = "class", required_unless_present = "class")]
    student: Option<i64>,
    /// Every active student of the class.
    #[arg(long)]
    class: Option<i64>,
    #[arg(long)]
    semester: i64,
}

#[derive(Args)]
struct IndicatorArgs {
    #[arg(long)]
    student: Option<i64>,
    #[arg(long)]
    semester: Option<i64>,
    #[arg(long)]
    subject: Option<i64>,
    #[arg(long)]
    class: Option<i64>,
    /// Only overall indicators.
    #[arg(long, conflicts_with = "subjects_only")]
    overall_only: bool,
    /// Only subject indicators.
    #[arg(long)]
    subjects_only: bool,
}

#[derive(Args)]
struct FilterArgs {
    #[arg(long)]
    class: Option<i64>,
    #[arg(long)]
    semester: Option<i64>,
    #[arg(long)]
    student: Option<i64>,
}

impl From<&FilterArgs> for ReportFilter {
    fn from(args: &FilterArgs) -> Self {
        ReportFilter {
            class_id: args.class.map(ClassId),
            semester_id: args.semester.map(SemesterId),
            student_id: args.student.map(StudentId),
        }
    }
}

#[derive(Subcommand)]
enum ReportCommands {
    /// Student count, mean average, mean progression and distribution.
    Summary(FilterArgs),
    /// Mean subject indicator per subject.
    Subjects(FilterArgs),
    /// Mean overall average per semester.
    Evolution(FilterArgs),
    /// Grades, indicators and chart series of one student.
    Student {
        #[arg(long)]
        student: i64,
    },
}

// ==============================================================================
// Command Logic
// ==============================================================================

#[derive(Deserialize)]
struct DirectoryFile {
    #[serde(default)]
    classes: Vec<Class>,
    #[serde(default)]
    students: Vec<Student>,
    #[serde(default)]
    subjects: Vec<Subject>,
    #[serde(default)]
    semesters: Vec<Semester>,
}

async fn handle_directory(args: DirectoryArgs, repo: &DbRepository) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let directory: DirectoryFile =
        serde_json::from_str(&raw).context("Invalid directory document")?;

    // Classes before students: students reference their class.
    for class in &directory.classes {
        repo.upsert_class(class).await?;
    }
    for student in &directory.students {
        repo.upsert_student(student).await?;
    }
    for subject in &directory.subjects {
        repo.upsert_subject(subject).await?;
    }
    for semester in &directory.semesters {
        repo.upsert_semester(semester).await?;
    }

    tracing::info!(file = %args.file.display(), "Directory loaded.");
    println!(
        "Loaded {} classes, {} students, {} subjects and {} semesters.",
        directory.classes.len(),
        directory.students.len(),
        directory.subjects.len(),
        directory.semesters.len()
    );
    Ok(())
}

/// Commits the grade change, then lets the change trigger finish the
/// recalculation it queued before the process exits.
async fn handle_grade(
    command: GradeCommands,
    repo: DbRepository,
    settings: &Settings,
) -> anyhow::Result<()> {
    let (target, grade_command) = match command {
        GradeCommands::Record { target, value } => {
            let value = GradeValue::new(value)?;
            let key = target.key();
            (target, GradeCommand::Record { key, value })
        }
        GradeCommands::Remove { target } => {
            let key = target.key();
            (target, GradeCommand::Remove { key })
        }
    };

    let store = Arc::new(repo);
    let (publisher, events) = events::channel(settings.trigger.channel_capacity);
    let writer = GradeWriter::new(store.clone(), publisher);
    let orchestrator = Arc::new(IndicatorOrchestrator::new(store));
    let trigger = ChangeTrigger::new(orchestrator).spawn(events);

    let committed = writer
        .commit(&[grade_command], UserId(target.actor))
        .await?;
    // Closing the channel lets the trigger drain and stop.
    drop(writer);
    trigger.await?;

    match committed {
        Some(event) => println!(
            "Committed {} grade change(s) as event {}.",
            event.changes.len(),
            event.event_id
        ),
        None => println!("Nothing to change."),
    }
    Ok(())
}

async fn handle_recalculate(args: RecalculateArgs, repo: DbRepository) -> anyhow::Result<()> {
    let orchestrator = IndicatorOrchestrator::new(Arc::new(repo));
    let semester_id = SemesterId(args.semester);

    let summaries = match (args.student, args.class) {
        (Some(student), _) => vec![
            orchestrator
                .recalculate_all(StudentId(student), semester_id)
                .await?,
        ],
        (None, Some(class)) => {
            let outcome = orchestrator
                .recalculate_class(ClassId(class), semester_id)
                .await?;
            for (student_id, error) in &outcome.failed {
                eprintln!("Student {student_id}: {error}");
            }
            outcome.recalculated
        }
        (None, None) => anyhow::bail!("either --student or --class is required"),
    };

    println!("{}", tables::recalculations(&summaries));
    Ok(())
}

async fn handle_indicators(args: IndicatorArgs, repo: &DbRepository) -> anyhow::Result<()> {
    let mut filter = if args.overall_only {
        IndicatorFilter::overall()
    } else if args.subjects_only {
        IndicatorFilter::subjects()
    } else {
        IndicatorFilter::default()
    };
    filter.student_id = args.student.map(StudentId);
    filter.semester_id = args.semester.map(SemesterId);
    filter.subject_id = args.subject.map(SubjectId);
    filter.class_id = args.class.map(ClassId);

    let records = repo.find_indicator_records(&filter).await?;
    println!("{}", tables::indicators(&records));
    Ok(())
}

async fn handle_report(command: ReportCommands, repo: DbRepository) -> anyhow::Result<()> {
    let reports = ReportingQueries::new(Arc::new(repo));
    match command {
        ReportCommands::Summary(filter) => {
            let summary = reports.summary(&ReportFilter::from(&filter)).await?;
            println!("{}", tables::summary(&summary));
        }
        ReportCommands::Subjects(filter) => {
            let rows = reports.by_subject(&ReportFilter::from(&filter)).await?;
            println!("{}", tables::subjects(&rows));
        }
        ReportCommands::Evolution(filter) => {
            let points = reports.evolution(&ReportFilter::from(&filter)).await?;
            println!("{}", tables::evolution(&points));
        }
        ReportCommands::Student { student } => {
            let detail = reports.student_detail(StudentId(student)).await?;
            println!(
                "{} ({}), class {}",
                detail.student.full_name(),
                detail.student.student_code,
                detail.class.name
            );
            println!("{}", tables::grades(&detail.grades));
            println!("{}", tables::indicators(&detail.indicators));
        }
    }
    Ok(())
}

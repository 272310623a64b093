use std::{convert::Infallible, path::PathBuf, process::ExitCode};

use chrono::Utc;
use clap::Parser;
use radosgw_assume::{
    duration, AssumeFlow, AssumedCredentials, EnvSource, Error, FlowSettings, ProfileSource,
    Progress, SessionDuration, Verification,
};
use tracing_subscriber::EnvFilter;

/// Obtain temporary RadosGW credentials through an OIDC identity provider.
///
/// Prints `export` statements on stdout, so use it as `eval $(radosgw-assume PROFILE)`.
#[derive(Debug, Parser)]
#[command(name = "radosgw-assume", version, about)]
struct Cli {
    /// Profile in the AWS config file (defaults to AWS_PROFILE, then `default`).
    #[arg(conflicts_with = "env")]
    profile: Option<String>,

    /// Read configuration from environment variables instead of a profile.
    #[arg(short, long)]
    env: bool,

    /// Credential lifetime, e.g. `1h`, `90m`, `1h30m` or seconds (15m to 12h).
    #[arg(short, long, default_value_t = SessionDuration::DEFAULT)]
    duration: SessionDuration,

    /// Log diagnostics and print usage hints on stderr.
    #[arg(short, long)]
    verbose: bool,

    /// Role session name (defaults to the profile name).
    #[arg(long, value_name = "NAME")]
    session_name: Option<String>,

    /// Print the sign-in URL instead of opening a browser.
    #[arg(long)]
    no_browser: bool,

    /// AWS config file (defaults to AWS_CONFIG_FILE, then ~/.aws/config).
    #[arg(long, value_name = "PATH")]
    config_file: Option<PathBuf>,
}

/// Prints a `#` to stderr every heartbeat while waiting for the user.
struct StderrProgress;

impl Progress for StderrProgress {
    fn tick(&self) {
        eprint!("#");
    }

    fn finish(&self) {
        eprintln!();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("Error: {error}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        concat!("warn,", env!("CARGO_CRATE_NAME"), "=debug")
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: &Cli) -> Result<(), Error> {
    let settings = FlowSettings {
        launch_browser: !cli.no_browser,
        ..FlowSettings::default()
    };
    let prompt = |verification: Verification| async move {
        eprintln!("# {verification}");
        Ok::<_, Infallible>(())
    };

    let builder = AssumeFlow::builder()
        .settings(settings)
        .session_duration(cli.duration)
        .verification_prompt(prompt)
        .progress(StderrProgress);
    let builder = match &cli.session_name {
        Some(name) => builder.session_label(name),
        None => builder,
    };

    let (credentials, profile) = if cli.env {
        let flow = builder.config(EnvSource::from_env()).build().await?;
        (flow.authenticate().await?, None)
    } else {
        let mut source = ProfileSource::default();
        if let Some(path) = &cli.config_file {
            source = source.with_config_file(path);
        }
        if let Some(profile) = &cli.profile {
            source = source.with_profile(profile);
        }
        let profile = source.profile_name()?;
        let flow = builder.config(source).build().await?;
        (flow.authenticate().await?, Some(profile))
    };

    print!("{}", credentials.shell_exports(profile.as_deref()));

    if cli.verbose {
        print_hints(&credentials, profile.as_deref());
    }
    Ok(())
}

fn print_hints(credentials: &AssumedCredentials, profile: Option<&str>) {
    let remaining = (credentials.expiration - Utc::now())
        .to_std()
        .unwrap_or_default();

    match profile {
        Some(profile) => eprintln!("# Credentials exported for profile: {profile}"),
        None => eprintln!("# Credentials exported from environment configuration"),
    }
    eprintln!(
        "# Valid until: {} ({})",
        credentials.expiration_rfc3339(),
        duration::format(remaining)
    );
    eprintln!(
        "# Usage: eval $(radosgw-assume {})",
        profile.unwrap_or("--env")
    );
    eprintln!(
        "# Test with: aws s3 ls --endpoint-url={}",
        credentials.endpoint
    );
}

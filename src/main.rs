use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use tracing_subscriber::EnvFilter;

use adlens::auth::GoogleOAuth;
use adlens::config::{self, Config, Credentials};
use adlens::dashboard::{Analysis, Dashboard, Insights};
use adlens::fallback::FallbackRequester;
use adlens::insights::InsightsService;
use adlens::providers::groq::GroqProvider;
use adlens::report::adsense::AdsenseClient;
use adlens::session::SessionStore;

const USAGE: &str = "\
usage: adlens [--config <path>] <command>

commands:
  auth-url              print the Google consent URL
  connect <code>        exchange an authorization code and list accounts
  accounts              list AdSense accounts
  report <account>      fetch the 30-day report and analyze it
  analyze               re-run analysis on the cached report
  status                show the cached session
  logout                forget tokens and cached data";

enum Command {
    AuthUrl,
    Connect(String),
    Accounts,
    Report(String),
    Analyze,
    Status,
    Logout,
}

struct Args {
    config: PathBuf,
    command: Command,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Args> {
    let mut config = PathBuf::from("adlens.toml");
    let mut positional = Vec::new();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = args.next().context("--config needs a path")?.into(),
            "-h" | "--help" => bail!("{USAGE}"),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let command = match (positional.next().as_deref(), positional.next()) {
        (Some("auth-url"), None) => Command::AuthUrl,
        (Some("connect"), Some(code)) => Command::Connect(code),
        (Some("accounts"), None) => Command::Accounts,
        (Some("report"), Some(account)) => Command::Report(account),
        (Some("analyze"), None) => Command::Analyze,
        (Some("status"), None) => Command::Status,
        (Some("logout"), None) => Command::Logout,
        _ => bail!("{USAGE}"),
    };
    if positional.next().is_some() {
        bail!("{USAGE}");
    }
    Ok(Args { config, command })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("adlens=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args(std::env::args().skip(1))?;
    let config = Config::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let credentials = Credentials::from_env();

    let http = reqwest::Client::new();
    let oauth = match (credentials.google_client_id, credentials.google_client_secret) {
        (Some(id), Some(secret)) => Some(GoogleOAuth::new(
            http.clone(),
            &config.adsense.token_url,
            id,
            secret,
            &config.adsense.redirect_uri,
        )),
        _ => None,
    };

    if let Command::AuthUrl = args.command {
        let oauth = config::require(oauth, "GOOGLE_CLIENT_ID/GOOGLE_CLIENT_SECRET")?;
        println!("{}", oauth.authorization_url()?);
        return Ok(());
    }

    let insights = match (&args.command, credentials.groq_api_key) {
        (Command::Report(_) | Command::Analyze, Some(groq_key)) => {
            let provider = GroqProvider::new(&config.llm.base_url, groq_key, config.llm_timeout())?;
            InsightsService::new(
                FallbackRequester::new(Arc::new(provider)),
                config.candidates(),
                config.adsense.max_analysis_rows,
                config.llm.temperature,
            )
        }
        (_, None) => InsightsService::unavailable("GROQ_API_KEY is not set"),
        (_, Some(_)) => InsightsService::unavailable("this command does not run analysis"),
    };
    let adsense = AdsenseClient::new(http, &config.adsense.api_base_url);
    let mut dashboard = Dashboard::new(oauth, adsense, insights, SessionStore::new(&config.session.path));

    match args.command {
        Command::AuthUrl => {}
        Command::Connect(code) => {
            let connection = dashboard.connect(&code).await.context("connecting AdSense")?;
            if let Some(name) = connection.profile.as_ref().and_then(|p| p.name.as_deref()) {
                println!("Welcome, {name}.");
            }
            print_accounts(&connection.accounts);
        }
        Command::Accounts => {
            let accounts = dashboard.accounts().await.context("listing accounts")?;
            print_accounts(&accounts);
        }
        Command::Report(account) => {
            let analysis = dashboard.select_account(&account).await.context("fetching report")?;
            print_analysis(&analysis);
        }
        Command::Analyze => {
            let analysis = dashboard.reanalyze().await?;
            print_analysis(&analysis);
        }
        Command::Status => {
            let session = dashboard.session();
            if !session.is_connected() {
                println!("Not connected.");
                return Ok(());
            }
            if let Some(email) = session.profile.as_ref().and_then(|p| p.email.as_deref()) {
                println!("Signed in as {email}.");
            }
            print_accounts(&session.accounts);
            match dashboard.cached() {
                Some(analysis) => print_analysis(&analysis),
                None => println!("No account selected."),
            }
        }
        Command::Logout => {
            dashboard.logout()?;
            println!("Logged out.");
        }
    }
    Ok(())
}

fn print_accounts(accounts: &[adlens::report::adsense::Account]) {
    if accounts.is_empty() {
        println!("No AdSense accounts.");
        return;
    }
    for account in accounts {
        match &account.display_name {
            Some(display) => println!("{}  {display}", account.name),
            None => println!("{}", account.name),
        }
    }
}

fn print_analysis(analysis: &Analysis) {
    println!("Account {}", analysis.account);
    if analysis.report.is_empty() {
        println!("No data found for the last 30 days.");
        return;
    }

    println!(
        "{:<32} {:>10} {:>10} {:>12} {:>8} {:>8} {:>7}",
        "site", "earnings", "views", "impressions", "clicks", "rpm", "ctr"
    );
    for row in &analysis.report {
        println!(
            "{:<32} {:>10.2} {:>10} {:>12} {:>8} {:>8.2} {:>6.2}%",
            row.site, row.earnings, row.page_views, row.impressions, row.clicks, row.rpm, row.ctr * 100.0
        );
    }
    let t = &analysis.totals;
    println!(
        "{:<32} {:>10.2} {:>10} {:>12} {:>8} {:>8.2} {:>6.2}%",
        "total", t.earnings, t.page_views, t.impressions, t.clicks, t.rpm, t.ctr * 100.0
    );

    println!();
    match &analysis.insights {
        Insights::Ready(list) => {
            for (i, insight) in list.iter().enumerate() {
                println!("{}. {insight}", i + 1);
            }
        }
        Insights::Unavailable(reason) => {
            println!("Insights are temporarily unavailable ({reason}). Try `adlens analyze` later.");
        }
        Insights::Skipped => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<Args> {
        parse_args(args.iter().map(|s| (*s).to_owned()))
    }

    #[test]
    fn parses_report_with_config() {
        let args = parse(&["--config", "custom.toml", "report", "accounts/pub-1"]).unwrap();
        assert_eq!(args.config, PathBuf::from("custom.toml"));
        assert!(matches!(args.command, Command::Report(ref a) if a == "accounts/pub-1"));
    }

    #[test]
    fn default_config_path() {
        let args = parse(&["status"]).unwrap();
        assert_eq!(args.config, PathBuf::from("adlens.toml"));
        assert!(matches!(args.command, Command::Status));
    }

    #[test]
    fn missing_argument_is_usage_error() {
        assert!(parse(&["connect"]).is_err());
        assert!(parse(&["report"]).is_err());
        assert!(parse(&[]).is_err());
        assert!(parse(&["status", "extra"]).is_err());
        assert!(parse(&["--config"]).is_err());
    }
}

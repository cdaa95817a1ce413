/// Run one reconciliation job on demand, outside the API server's daily loops.
/// Suitable for cron (e.g. 0 9 1-5,15-20 * * /app/reconcile --job reminders)
///
/// Usage: reconcile --job prices|scan|reminders [--school SLUG] [--date YYYY-MM-DD]
///   --school SLUG : Only this school (optional, all active schools if not specified)
///   --date DATE   : Date the job runs for (optional, today if not specified)

use chrono::{Local, NaiveDate};
use clap::{Parser, ValueEnum};
use sportschool_api::db::{self, postgres::PgStore};
use sportschool_api::models::school::is_valid_slug;
use sportschool_api::services::{notifications::PushNotifier, reconciliation, store::LifecycleStore};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Job {
    /// Re-apply sibling pricing to every family
    Prices,
    /// List children with no monthly payment for the month
    Scan,
    /// Notify guardians of unpaid children (payment windows only)
    Reminders,
}

#[derive(Parser)]
#[command(name = "reconcile", about = "Run sportschool reconciliation jobs")]
struct Args {
    #[arg(long, value_enum)]
    job: Job,

    /// School slug (optional, all active schools if not specified)
    #[arg(long)]
    school: Option<String>,

    /// Date to run for, YYYY-MM-DD (optional, today if not specified)
    #[arg(long)]
    date: Option<NaiveDate>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();
    let today = args.date.unwrap_or_else(|| Local::now().date_naive());

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable not set"))?;
    let pool = db::create_pool(&database_url).await?;
    let store = PgStore::new(pool.clone());
    let notifier = PushNotifier::new(
        pool,
        std::env::var("FCM_API_KEY").ok().filter(|s| !s.is_empty()),
    );

    let schools: Vec<String> = match args.school {
        Some(slug) => {
            let slug = slug.to_lowercase();
            anyhow::ensure!(is_valid_slug(&slug), "Invalid school slug: {slug}");
            vec![slug]
        }
        None => store
            .list_active_schools()
            .await?
            .into_iter()
            .map(|s| s.slug)
            .collect(),
    };

    tracing::info!("Running {:?} for {} school(s) on {}", args.job, schools.len(), today);

    for slug in schools {
        let result = match args.job {
            Job::Prices => reconciliation::recompute_prices(&store, &slug)
                .await
                .map(|r| tracing::info!("{slug}: {r:?}")),
            Job::Scan => reconciliation::scan_pending_payments(&store, &slug, today)
                .await
                .map(|unpaid| {
                    for child in unpaid {
                        println!(
                            "{}\t{}\t{}\t{}\t{}",
                            slug, child.child_id, child.child_name, child.guardian_id, child.monthly_fee
                        );
                    }
                }),
            Job::Reminders => reconciliation::emit_reminders(&store, &notifier, &slug, today)
                .await
                .map(|r| tracing::info!("{slug}: {r:?}")),
        };
        if let Err(e) = result {
            tracing::error!("Error reconciling school {}: {}", slug, e);
        }
    }

    Ok(())
}

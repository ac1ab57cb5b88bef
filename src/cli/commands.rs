//! Command dispatch: maps parsed arguments onto services.

use std::collections::BTreeSet;
use std::io;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use clap::CommandFactory;
use clap_complete::generate;
use tracing::{debug, instrument};

use crate::application::services::CheckReport;
use crate::cli::args::{Cli, Commands, ConfigCommands, WindowArgs};
use crate::cli::error::{CliError, CliResult};
use crate::cli::output;
use crate::config::{global_config_path, Settings};
use crate::domain::{DayWindow, PartnerTree, SiteFilter, TreeRender, UserId};
use crate::infrastructure::di::ServiceContainer;
use crate::infrastructure::InfraError;

const DEFAULT_WINDOW_DAYS: u32 = 30;

pub fn execute_command(cli: &Cli) -> CliResult<()> {
    let Some(command) = &cli.command else {
        return Err(CliError::Usage(
            "no command given, see `ptree --help`".to_string(),
        ));
    };

    match command {
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
        Commands::Config { command } => cmd_config(cli, command),
        _ => {
            let container = build_container(cli)?;
            dispatch(command, &container)
        }
    }
}

fn load_settings(cli: &Cli) -> CliResult<Settings> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(feed) = &cli.feed {
        settings.feed_path = Some(feed.clone());
    }
    if let Some(ledger) = &cli.ledger {
        settings.ledger_path = Some(ledger.clone());
    }
    Ok(settings)
}

fn build_container(cli: &Cli) -> CliResult<ServiceContainer> {
    let settings = load_settings(cli)?;
    debug!(feed = ?settings.feed_path, ledger = ?settings.ledger_path, "building services");
    Ok(ServiceContainer::new(settings)?)
}

fn dispatch(command: &Commands, c: &ServiceContainer) -> CliResult<()> {
    let tree = c.snapshots.current();
    match command {
        Commands::Family {
            user_id,
            direct,
            include_self,
        } => {
            ensure_known(&tree, *user_id)?;
            print_ids(&tree.family_member_ids(*user_id, *direct, *include_self));
        }
        Commands::Surpassed { user_id, direct } => {
            ensure_known(&tree, *user_id)?;
            print_ids(&tree.surpassed_ids(*user_id, *direct));
        }
        Commands::SurpassedTeam {
            user_id,
            direct,
            depth,
        } => {
            ensure_known(&tree, *user_id)?;
            let depth = match depth {
                Some(0) => None,
                Some(n) => Some(*n),
                None => c.settings.team_depth(),
            };
            print_ids(&tree.surpassed_team_ids(*user_id, *direct, depth));
        }
        Commands::Bq {
            user_id,
            direct,
            ignore_surpassed,
            level,
        } => {
            ensure_known(&tree, *user_id)?;
            for partner in tree.my_partners_at(*user_id, (*level).into(), *direct, *ignore_surpassed) {
                let upgraded = partner
                    .upgrade_time()
                    .at((*level).into())
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string());
                output::info(&format!("{}\t{}", partner.user_id, upgraded));
            }
        }
        Commands::BredBy { user_id } => {
            ensure_known(&tree, *user_id)?;
            let chain = tree.bred_by_ids(*user_id);
            output::info(
                &std::iter::once(*user_id)
                    .chain(chain)
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(" <- "),
            );
        }
        Commands::Team {
            user_id,
            direct,
            exclude_self,
        } => {
            ensure_known(&tree, *user_id)?;
            print_ids(&tree.team_member_ids(*user_id, *direct, *exclude_self));
        }
        Commands::Show { user_id } => {
            let partner = tree.get(*user_id)?;
            let rendered = toml::to_string_pretty(&partner.snapshot())
                .map_err(|e| InfraError::Parse {
                    context: format!("render partner {}", user_id),
                    message: e.to_string(),
                })?;
            output::info(rendered.trim_end());
        }
        Commands::Tree { user_id, depth } => cmd_tree(&tree, *user_id, *depth)?,
        Commands::Sites {
            masters,
            slaves,
            new,
            gmv,
            window,
        } => {
            let filter = SiteFilter {
                master_site_ids: (!masters.is_empty()).then(|| masters.iter().copied().collect()),
                slave_site_ids: (!slaves.is_empty()).then(|| slaves.iter().copied().collect()),
            };
            let window = resolve_window(c, window)?;
            let sites = if *new {
                tree.new_partners_by_site(&window, &filter)
            } else {
                tree.partners_by_site(&filter)
            };
            let gmv = if *gmv {
                let token = c.aggregator.token();
                Some(if *new {
                    c.aggregator.new_gmv_by_site(&tree, &window, &filter, &token)?
                } else {
                    c.aggregator.gmv_by_site(&tree, &window, &filter, &token)?
                })
            } else {
                None
            };
            for (site, ids) in &sites {
                match gmv.as_ref().and_then(|g| g.get(site)) {
                    Some(total) => output::header(&format!("site {} ({} partners, gmv {})", site, ids.len(), total)),
                    None => output::header(&format!("site {} ({} partners)", site, ids.len())),
                }
                output::detail(&join_ids(ids));
            }
        }
        Commands::Upgrade { level } => {
            let service = c.qualification()?;
            for level in level.levels() {
                if let Some(report) = service.run(level) {
                    print_report(&report);
                }
            }
        }
        Commands::Gmv {
            user_ids,
            team,
            exclude_self,
            window,
        } => {
            let window = resolve_window(c, window)?;
            let token = c.aggregator.token();
            let gmv = if *team {
                c.aggregator.team_gmvs(&tree, user_ids, &window, *exclude_self, &token)?
            } else {
                c.aggregator.gmv_by_user_ids(user_ids, &window, &token)?
            };
            output::header(&format!("GMV {}", window));
            for (id, amount) in &gmv {
                output::detail(&format!("{}\t{}", id, amount));
            }
            output::action("total", &gmv.values().sum::<i64>());
        }
        Commands::Bonus {
            user_ids,
            bred_from,
            window,
        } => {
            let window = resolve_window(c, window)?;
            let token = c.aggregator.token();
            if bred_from.is_empty() {
                let totals = c.aggregator.received_amounts(user_ids, &window, &token)?;
                output::header(&format!("bonus {}", window));
                for (bonus_type, amount) in totals.iter() {
                    output::detail(&format!("{}\t{}", bonus_type, amount));
                }
                output::action("total", &totals.total());
            } else {
                let [recipient] = user_ids.as_slice() else {
                    return Err(CliError::InvalidArgs(
                        "--bred-from takes exactly one recipient".to_string(),
                    ));
                };
                let amount = c
                    .aggregator
                    .received_bred_amount_from(*recipient, bred_from, &window, &token)?;
                output::action("bred", &amount);
            }
        }
        Commands::Cohort { user_id, window } => {
            ensure_known(&tree, *user_id)?;
            let window = resolve_window(c, window)?;
            let all: Vec<UserId> = tree.team_member_ids(*user_id, false, false).into_iter().collect();
            let new: Vec<UserId> = all
                .iter()
                .copied()
                .filter(|id| tree.partner(*id).is_some_and(|p| window.contains(p.joined_at)))
                .collect();
            let report = c
                .aggregator
                .cohort_compare(&new, &all, &window, &c.aggregator.token())?;
            output::header(&format!("cohort {} {}", user_id, window));
            for (label, cohort) in [("new", &report.new), ("all", &report.all), ("rest", &report.delta())] {
                output::detail(&format!(
                    "{:<5} members {:>6}  gmv {:>12}  bonus {:>12}",
                    label,
                    cohort.members,
                    cohort.gmv,
                    cohort.bonus.total()
                ));
            }
        }
        Commands::Config { .. } | Commands::Completion { .. } => {}
    }
    Ok(())
}

#[instrument(skip(tree))]
fn cmd_tree(tree: &PartnerTree, user_id: Option<UserId>, depth: Option<usize>) -> CliResult<()> {
    let roots = match user_id {
        Some(id) => {
            ensure_known(tree, id)?;
            vec![id]
        }
        None => tree.root_ids(),
    };
    for id in roots {
        if let Some(rendered) = tree.to_tree_string(id, depth) {
            output::info(&rendered);
        }
    }
    Ok(())
}

fn cmd_config(cli: &Cli, command: &ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Show => {
            let settings = load_settings(cli)?;
            output::info(settings.to_toml()?.trim_end());
        }
        ConfigCommands::Path => {
            match global_config_path() {
                Some(path) => {
                    let marker = if path.exists() { "" } else { " (not found)" };
                    output::action("global", &format!("{}{}", path.display(), marker));
                }
                None => output::warning("no config directory on this platform"),
            }
            if let Some(local) = &cli.config {
                output::action("local", &local.display());
            }
        }
    }
    Ok(())
}

fn resolve_window(c: &ServiceContainer, args: &WindowArgs) -> CliResult<DayWindow> {
    let offset = c.settings.utc_offset()?;
    if let Some(month) = &args.month {
        let first = NaiveDate::parse_from_str(&format!("{}-01", month), "%Y-%m-%d")
            .map_err(|_| CliError::InvalidArgs(format!("expected YYYY-MM, got {}", month)))?;
        return Ok(DayWindow::month(first.year(), first.month(), offset)?);
    }
    if let (Some(from), Some(to)) = (&args.from, &args.to) {
        return Ok(c.window(from, to)?);
    }
    let today = DateTime::<Utc>::from_timestamp(c.clock.now(), 0)
        .unwrap_or_default()
        .with_timezone(&offset)
        .date_naive();
    Ok(DayWindow::trailing_days(today, DEFAULT_WINDOW_DAYS, offset)?)
}

fn ensure_known(tree: &PartnerTree, user_id: UserId) -> CliResult<()> {
    tree.get(user_id)?;
    Ok(())
}

fn join_ids<'a>(ids: impl IntoIterator<Item = &'a UserId>) -> String {
    ids.into_iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn print_ids(ids: &BTreeSet<UserId>) {
    if ids.is_empty() {
        output::detail("(none)");
    } else {
        output::info(&join_ids(ids));
    }
}

fn print_report(report: &CheckReport) {
    let summary = report.summary();
    output::header(&format!("{} checker", summary.target));
    output::detail(&format!(
        "evaluated {}, exempt {}, promoted {}, errors {}",
        summary.evaluated, summary.exempt, summary.promoted, summary.errors
    ));
    for id in &report.promoted {
        output::success_detail(&format!("{} -> {}", id, summary.target));
    }
    for (id, e) in &report.errors {
        output::failure(&format!("{}: {}", id, e));
    }
}

mod config;

use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    account::{PasswordChangeForm, PasswordResetForm, ProfileForm, RegistrationForm},
    catalog::ModuleCatalog,
    credential::{peek_claims, FileCredentialStore},
    management::{CourseWizard, UserDirectory},
    progress::{parse_date, FilterUpdate, ProgressAggregator},
    simulation::{option_label, AttemptSync, LockedAnswer, PlayerState, SimulationPlayer},
    LogoutReason, ReaccionaClient, Session, SessionEvent, SessionState,
};
use shared::domain::{CategoryFilter, ModuleId, OptionId, Role, UserId};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "reacciona", about = "Emergency-response training client")]
struct Cli {
    /// Config file; defaults to ./reacciona.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    api_url: Option<String>,
    #[arg(long, global = true)]
    credential_path: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        email: String,
        /// Prompted for when omitted.
        #[arg(long)]
        password: Option<String>,
    },
    Logout,
    Status,
    Register {
        name: String,
        email: String,
        #[arg(long)]
        password: Option<String>,
    },
    ForgotPassword {
        email: String,
    },
    ResetPassword {
        /// Token from the recovery link.
        #[arg(long)]
        token: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        confirmation: Option<String>,
    },
    Modules {
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value = "")]
        search: String,
    },
    Simulate {
        module_id: i64,
    },
    Restart {
        module_id: i64,
        #[arg(long)]
        yes: bool,
    },
    Progress {
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
        #[arg(long)]
        module: Option<i64>,
        #[arg(long)]
        category: Option<String>,
    },
    Users {
        #[arg(long, default_value = "")]
        search: String,
    },
    SetRole {
        user_id: i64,
        /// student, teacher, admin or the numeric id.
        role: String,
    },
    CreateClass {
        name: String,
        description: String,
        #[arg(long)]
        instructor: Option<i64>,
        #[arg(long, value_delimiter = ',')]
        modules: Vec<i64>,
        #[arg(long, value_delimiter = ',')]
        students: Vec<i64>,
    },
    Profile {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    ChangePassword {
        #[arg(long)]
        current: Option<String>,
        #[arg(long)]
        new: Option<String>,
        #[arg(long)]
        confirmation: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = config::load_settings(cli.config.as_deref())?;
    if let Some(api_url) = &cli.api_url {
        settings.api_base_url = api_url.clone();
    }
    if let Some(path) = &cli.credential_path {
        settings.credential_path = path.clone();
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let store = Arc::new(FileCredentialStore::new(&settings.credential_path));
    let session = Session::new(store.clone());
    let mut events = session.subscribe();
    let client = Arc::new(ReaccionaClient::new(&settings.api_base_url, session.clone())?);

    if let Err(err) = client.restore_session().await {
        tracing::warn!("could not restore the stored session: {err}");
    }

    let result = run(cli.command, &client, &store).await;
    report_session_events(&mut events);
    result
}

async fn run(
    command: Command,
    client: &Arc<ReaccionaClient>,
    store: &FileCredentialStore,
) -> Result<()> {
    match command {
        Command::Login { email, password } => {
            let password = value_or_prompt(password, "password")?;
            let profile = client.login(&email, &password).await?;
            println!(
                "logged in as {} ({}, {} points)",
                profile.name, profile.role, profile.points
            );
        }
        Command::Logout => {
            client.logout().await;
            println!("logged out");
        }
        Command::Status => print_status(client, store).await,
        Command::Register {
            name,
            email,
            password,
        } => {
            let password = value_or_prompt(password, "password")?;
            client
                .register(RegistrationForm {
                    name,
                    email,
                    password,
                })
                .await?;
            println!("account created; run `reacciona login <email>`");
        }
        Command::ForgotPassword { email } => {
            client.forgot_password(&email).await?;
            println!("if the email is registered, a recovery link is on its way");
        }
        Command::ResetPassword {
            token,
            password,
            confirmation,
        } => {
            let password = value_or_prompt(password, "new password")?;
            let confirmation = value_or_prompt(confirmation, "confirm new password")?;
            client
                .reset_password(PasswordResetForm {
                    token,
                    password,
                    confirmation,
                })
                .await?;
            println!("password updated; log in with the new password");
        }
        Command::Modules { category, search } => {
            let mut catalog = ModuleCatalog::new(client.clone());
            catalog.load().await?;
            let category = category
                .as_deref()
                .map(CategoryFilter::parse)
                .unwrap_or_default();
            let modules = catalog.filter(&category, &search);
            if modules.is_empty() {
                println!("no modules match");
            }
            for module in modules {
                let mut details = Vec::new();
                if let Some(category) = &module.category {
                    details.push(category.to_string());
                }
                if let Some(difficulty) = &module.difficulty {
                    details.push(difficulty.clone());
                }
                if let Some(minutes) = module.estimated_minutes {
                    details.push(format!("~{minutes} min"));
                }
                println!("[{}] {} ({})", module.id, module.title, details.join(", "));
            }
        }
        Command::Simulate { module_id } => {
            let mut player = SimulationPlayer::new(client.clone());
            player.load(ModuleId(module_id)).await?;
            play(&mut player).await?;
        }
        Command::Restart { module_id, yes } => {
            let mut player = SimulationPlayer::new(client.clone());
            player.load(ModuleId(module_id)).await?;
            if yes || confirm("restart the simulation and clear every answer?")? {
                player.restart().await?;
                println!("simulation restarted");
            } else {
                println!("cancelled");
            }
        }
        Command::Progress {
            from,
            to,
            module,
            category,
        } => {
            let aggregator = ProgressAggregator::new(client.clone(), client.session().clone());
            let update = FilterUpdate {
                from: from.as_deref().map(parse_date).transpose()?.map(Some),
                to: to.as_deref().map(parse_date).transpose()?.map(Some),
                module_id: module.map(|id| Some(ModuleId(id))),
                category: category.as_deref().map(CategoryFilter::parse),
            };
            if !client.session().is_authenticated().await {
                bail!("not logged in; run `reacciona login <email>`");
            }
            let categories = aggregator.load_categories().await;
            if let Err(err) = aggregator.query(update).await {
                let view = aggregator.view();
                bail!(view.error.unwrap_or_else(|| err.to_string()));
            }
            print_progress(&aggregator, &categories);
        }
        Command::Users { search } => {
            let mut directory = UserDirectory::new(client.clone(), client.session().clone());
            directory.load().await?;
            for user in directory.filter_by_name(&search) {
                println!(
                    "[{}] {:<24} {:<28} {}",
                    user.user_id, user.name, user.email, user.role
                );
            }
        }
        Command::SetRole { user_id, role } => {
            let role = Role::parse(&role)
                .ok_or_else(|| anyhow!("unknown role '{role}'; use student, teacher or admin"))?;
            let mut directory = UserDirectory::new(client.clone(), client.session().clone());
            directory.load().await?;
            directory.change_role(UserId(user_id), role).await?;
            println!("user {user_id} is now {role}");
        }
        Command::CreateClass {
            name,
            description,
            instructor,
            modules,
            students,
        } => create_class(client, &name, &description, instructor, modules, students).await?,
        Command::Profile { name, email } => {
            let current = client.refresh_profile().await?;
            if name.is_none() && email.is_none() {
                println!("{} <{}>", current.name, current.email);
                println!("role: {}  points: {}", current.role, current.points);
                return Ok(());
            }
            let updated = client
                .update_profile(ProfileForm {
                    name: name.unwrap_or(current.name),
                    email: email.unwrap_or(current.email),
                })
                .await?;
            println!("profile updated: {} <{}>", updated.name, updated.email);
        }
        Command::ChangePassword {
            current,
            new,
            confirmation,
        } => {
            let current = value_or_prompt(current, "current password")?;
            let new = value_or_prompt(new, "new password")?;
            let confirmation = value_or_prompt(confirmation, "confirm new password")?;
            client
                .change_password(PasswordChangeForm {
                    current,
                    new,
                    confirmation,
                })
                .await?;
            println!("password changed");
        }
    }
    Ok(())
}

async fn print_status(client: &ReaccionaClient, store: &FileCredentialStore) {
    println!("api: {}", client.base_url());
    println!("credential file: {}", store.path().display());
    match client.session().state().await {
        SessionState::Authenticated { token, profile } => {
            println!(
                "logged in as {} <{}> ({})",
                profile.name, profile.email, profile.role
            );
            let claims = peek_claims(&token);
            if let Some(issued_at) = claims.as_ref().and_then(|claims| claims.issued_at) {
                println!("credential issued {}", issued_at.format("%Y-%m-%d %H:%M UTC"));
            }
            if let Some(expires_at) = claims.and_then(|claims| claims.expires_at) {
                println!("credential expires {}", expires_at.format("%Y-%m-%d %H:%M UTC"));
            }
        }
        SessionState::Pending | SessionState::Unauthenticated => println!("not logged in"),
    }
}

fn print_progress(aggregator: &ProgressAggregator, categories: &[shared::domain::EmergencyCategory]) {
    let Some(summary) = aggregator.view().data else {
        println!("no progress data");
        return;
    };
    println!(
        "modules: {} total, {} completed, {} in progress, {} not started",
        summary.total_modules,
        summary.completed_modules,
        summary.in_progress_modules,
        summary.not_started_modules
    );
    println!("total score: {}", summary.total_score);
    for module in &summary.modules {
        println!(
            "  [{}] {:<32} {:>3}% {:<12} {}/{} steps, {} pts",
            module.module_id,
            module.title,
            module.percent,
            module.status.label(),
            module.completed_steps,
            module.total_steps,
            module.score
        );
    }
    if !summary.achievements.is_empty() {
        println!("achievements:");
    }
    for achievement in &summary.achievements {
        let obtained = achievement
            .obtained_at
            .map(|at| at.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("  {} {} ({obtained})", achievement.icon, achievement.name);
    }
    if !categories.is_empty() {
        let names: Vec<_> = categories.iter().map(|category| category.as_str()).collect();
        println!("categories: {}", names.join(", "));
    }
}

async fn create_class(
    client: &Arc<ReaccionaClient>,
    name: &str,
    description: &str,
    instructor: Option<i64>,
    modules: Vec<i64>,
    students: Vec<i64>,
) -> Result<()> {
    let mut wizard = CourseWizard::new(client.clone());
    wizard.load_instructors().await?;
    let Some(instructor) = instructor else {
        println!("teachers:");
        for member in wizard.instructors() {
            println!("  [{}] {} <{}>", member.id, member.name, member.email);
        }
        bail!("pick a teacher with --instructor <id>");
    };

    let class = wizard
        .submit_details(name, description, Some(UserId(instructor)))
        .await?;
    println!("class {} created: {}", class.id, class.name);
    if let Some(message) = wizard.list_error() {
        bail!("{message}");
    }

    for module_id in modules {
        wizard.toggle_module(ModuleId(module_id));
    }
    if wizard.selected_modules().is_empty() {
        println!("modules:");
        for module in wizard.modules() {
            println!("  [{}] {}", module.id, module.title);
        }
    }
    wizard.assign_modules().await?;
    println!("{} module(s) assigned", wizard.selected_modules().len());
    if let Some(message) = wizard.list_error() {
        bail!("{message}");
    }

    for student_id in students {
        wizard.toggle_student(UserId(student_id));
    }
    if wizard.selected_students().is_empty() {
        println!("students without a class:");
        for student in wizard.students() {
            println!("  [{}] {} <{}>", student.id, student.name, student.email);
        }
    }
    wizard.assign_students().await?;
    println!("{} student(s) enrolled", wizard.selected_students().len());
    Ok(())
}

async fn play(player: &mut SimulationPlayer) -> Result<()> {
    if let Some(scenario) = player.scenario() {
        println!("== {} / {} ==", scenario.module_title, scenario.content_title);
        if !scenario.content_body.is_empty() {
            println!("{}", scenario.content_body);
        }
    }

    loop {
        match player.state().clone() {
            PlayerState::Ready { step_index } => {
                render_step(player, step_index);
                let input = prompt("answer (letter, r = restart, q = quit)")?;
                match input.as_str() {
                    "q" => return Ok(()),
                    "r" => restart(player).await?,
                    raw => {
                        let Some(option_id) = parse_answer(player, raw) else {
                            println!("unknown option '{raw}'");
                            continue;
                        };
                        let answer = player.select_option(option_id).await?;
                        render_answer(&answer);
                    }
                }
            }
            PlayerState::Answered { step_index, answer } => {
                if answer.sync == AttemptSync::Resumed {
                    render_step(player, step_index);
                    render_answer(&answer);
                }
                match prompt("[enter] continue, r = restart, q = quit")?.as_str() {
                    "q" => return Ok(()),
                    "r" => restart(player).await?,
                    _ => {
                        player.continue_to_next()?;
                    }
                }
            }
            PlayerState::Finished { answer, .. } => {
                if answer.sync == AttemptSync::Resumed {
                    render_answer(&answer);
                }
                println!(
                    "simulation finished ({}% complete)",
                    player.completion_percent()
                );
                match prompt("r = restart, q = quit")?.as_str() {
                    "r" => restart(player).await?,
                    _ => return Ok(()),
                }
            }
            PlayerState::Unavailable { reason } => bail!("simulation unavailable: {reason}"),
            PlayerState::Loading => bail!("simulation is not loaded"),
        }
    }
}

async fn restart(player: &mut SimulationPlayer) -> Result<()> {
    if !confirm("restart the simulation and clear every answer?")? {
        return Ok(());
    }
    if let Err(err) = player.restart().await {
        println!("restart failed: {err}");
    }
    Ok(())
}

fn render_step(player: &SimulationPlayer, step_index: usize) {
    let Some(step) = player.current_step() else {
        return;
    };
    println!();
    println!(
        "-- step {}/{} ({}% complete) --",
        step_index + 1,
        player.total_steps(),
        player.completion_percent()
    );
    if let Some(video) = step.video_file_name() {
        println!("video: {video}");
    }
    if !step.scenario.is_empty() {
        println!("{}", step.scenario);
    }
    println!("{}", step.description);
    for (position, option) in step.options.iter().enumerate() {
        println!("  {}) {}", option_label(position), option.text);
    }
}

fn render_answer(answer: &LockedAnswer) {
    let verdict = if answer.is_correct {
        "correct"
    } else {
        "incorrect"
    };
    println!("{verdict}: {}", answer.feedback);
    if let AttemptSync::Failed(reason) = &answer.sync {
        println!("warning: the answer was not saved ({reason})");
    }
}

/// Maps a typed letter to the option at that position of the current step.
fn parse_answer(player: &SimulationPlayer, raw: &str) -> Option<OptionId> {
    let step = player.current_step()?;
    let mut chars = raw.trim().chars();
    let letter = chars.next()?.to_ascii_uppercase();
    if chars.next().is_some() {
        return None;
    }
    step.options
        .iter()
        .enumerate()
        .find(|(position, _)| option_label(*position) == letter)
        .map(|(_, option)| option.id)
}

fn report_session_events(events: &mut broadcast::Receiver<SessionEvent>) {
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::LoggedOut {
            reason: LogoutReason::CredentialRejected,
        } = event
        {
            eprintln!("session expired or was rejected; run `reacciona login <email>`");
        }
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{label}: ");
    io::stdout().flush()?;
    let mut line = String::new();
    let read = io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read from stdin")?;
    if read == 0 {
        bail!("stdin closed");
    }
    Ok(line.trim().to_string())
}

fn value_or_prompt(value: Option<String>, label: &str) -> Result<String> {
    match value {
        Some(value) => Ok(value),
        None => prompt(label),
    }
}

fn confirm(question: &str) -> Result<bool> {
    let answer = prompt(&format!("{question} [y/N]"))?;
    Ok(matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes"))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;

use crate::config::CoursebookConfig;
use crate::connectivity::TcpProbe;
use crate::courses::CourseService;
use crate::database::models::Student;
use crate::database::Database;
use crate::monitor::ConnectivityMonitor;
use crate::remote::HttpRemote;
use crate::roster::{RosterService, RosterState};
use anyhow::Result;
use clap::Subcommand;
use std::sync::Arc;
use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List courses from the remote authority.
    Courses,
    /// List the students enrolled in a course.
    Students {
        /// Remote course id.
        course_id: i64,
    },
    /// Show a single student by remote id.
    Student { remote_id: i64 },
    /// Enroll a student in a course.
    Add {
        course_id: i64,
        name: String,
        email: String,
        #[arg(default_value = "")]
        phone: String,
    },
    /// Edit a cached student, addressed by local id.
    Update {
        local_id: i64,
        course_id: i64,
        name: String,
        email: String,
        #[arg(default_value = "")]
        phone: String,
    },
    /// Remove a cached student, addressed by local id.
    Remove { local_id: i64, course_id: i64 },
    /// Push pending local changes to the remote authority.
    Sync,
    /// List records awaiting reconciliation.
    Pending,
    /// Follow a course roster, reacting to connectivity changes until
    /// interrupted.
    Watch { course_id: i64 },
}

struct Services {
    roster: RosterService,
    courses: CourseService,
    probe: Arc<TcpProbe>,
    database: Database,
    poll_interval: Duration,
}

fn build_services(config: &CoursebookConfig) -> Result<Services> {
    let database = Database::connect(&config.paths)?;
    let remote = Arc::new(HttpRemote::new(&config.api_base_url)?);
    let probe = Arc::new(TcpProbe::new(&config.probe_addr, PROBE_TIMEOUT));
    let roster = RosterService::new(database.clone(), remote.clone(), probe.clone());
    let courses = CourseService::new(remote);
    Ok(Services {
        roster,
        courses,
        probe,
        database,
        poll_interval: config.poll_interval,
    })
}

fn print_roster(state: &RosterState) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(state)?);
    Ok(())
}

pub async fn run(command: Command, config: CoursebookConfig) -> Result<()> {
    let services = build_services(&config)?;
    match command {
        Command::Courses => {
            let state = services.courses.fetch_courses().await;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        Command::Students { course_id } => {
            let state = services.roster.fetch_by_course(course_id).await;
            print_roster(&state)?;
        }
        Command::Student { remote_id } => {
            let state = services.roster.fetch_by_id(remote_id).await;
            print_roster(&state)?;
        }
        Command::Add {
            course_id,
            name,
            email,
            phone,
        } => {
            let state = services
                .roster
                .add_student(Student {
                    id: None,
                    name,
                    email,
                    phone,
                    course_id,
                })
                .await;
            print_roster(&state)?;
        }
        Command::Update {
            local_id,
            course_id,
            name,
            email,
            phone,
        } => {
            let state = services
                .roster
                .update_student(
                    local_id,
                    Student {
                        id: None,
                        name,
                        email,
                        phone,
                        course_id,
                    },
                )
                .await;
            print_roster(&state)?;
        }
        Command::Remove {
            local_id,
            course_id,
        } => {
            let state = services.roster.delete_student(local_id, course_id).await;
            print_roster(&state)?;
        }
        Command::Sync => {
            let report = services.roster.sync_now().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Pending => {
            let pending = services
                .database
                .with_repositories(|repos| {
                    use crate::database::repositories::StudentRepository;
                    repos.students().list_unsynced()
                })?;
            println!("{}", serde_json::to_string_pretty(&pending)?);
        }
        Command::Watch { course_id } => {
            watch_course(services, course_id).await?;
        }
    }
    Ok(())
}

/// Follows a course roster: prints every published snapshot while the
/// connectivity monitor keeps the cache reconciled in the background.
async fn watch_course(services: Services, course_id: i64) -> Result<()> {
    let mut updates = services.roster.subscribe();
    let monitor = ConnectivityMonitor::spawn(
        services.probe.clone(),
        services.roster.clone(),
        services.poll_interval,
    );

    let state = services.roster.fetch_by_course(course_id).await;
    print_roster(&state)?;

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                // Intermediate loading snapshots are noise in a terminal
                // stream.
                if !snapshot.loading {
                    print_roster(&snapshot)?;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received, shutting down");
                break;
            }
        }
    }

    monitor.shutdown().await;
    Ok(())
}

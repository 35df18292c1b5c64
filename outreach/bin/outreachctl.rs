//! Command-line utility for managing the outreach daemon
//!
//! This tool talks to a running daemon over its control socket and covers:
//! - Campaign lifecycle (create, launch, pause, resume, delete)
//! - Contacts and enrollments
//! - Job inspection and retries
//! - The mail session (connect, import, disconnect)
//! - System status, statistics and on-demand dispatcher ticks

#![allow(clippy::items_after_statements, clippy::single_match_else)]

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use outreach_common::{CampaignId, Contact, ContactId, EmailJob, EmailTemplate, JobId, JobStatus};
use outreach_control::{
    CampaignCommand, ContactCommand, ControlClient, DEFAULT_CONTROL_SOCKET, JobCommand,
    RequestCommand, ResponseData, SessionCommand, SystemCommand, protocol::format_timestamp,
};

/// Command-line utility for managing the outreach daemon
#[derive(Parser, Debug)]
#[command(name = "outreachctl")]
#[command(about = "Manage the outreach campaign daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the control socket
    #[arg(short = 'c', long, default_value = DEFAULT_CONTROL_SOCKET)]
    control_socket: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Campaign lifecycle and enrollment
    Campaign {
        #[command(subcommand)]
        action: CampaignAction,
    },
    /// Contact management
    Contact {
        #[command(subcommand)]
        action: ContactAction,
    },
    /// Email job inspection and retries
    Job {
        #[command(subcommand)]
        action: JobAction,
    },
    /// Mail session management
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// System status and health
    System {
        #[command(subcommand)]
        action: SystemAction,
    },
}

#[derive(Subcommand, Debug)]
enum CampaignAction {
    /// Create a draft campaign
    Create {
        #[arg(long)]
        name: String,
        /// RON file holding the list of steps
        #[arg(long)]
        steps: PathBuf,
    },
    /// List all campaigns
    List,
    /// Show a campaign with its contacts and jobs
    Show { id: CampaignId },
    /// Launch a draft campaign
    Launch { id: CampaignId },
    /// Pause an active campaign
    Pause { id: CampaignId },
    /// Resume a paused campaign
    Resume { id: CampaignId },
    /// Delete a campaign with its enrollments and jobs
    Delete { id: CampaignId },
    /// Enroll a contact into a campaign
    Enroll {
        campaign: CampaignId,
        contact: ContactId,
    },
    /// Remove a contact from a campaign along with its unsent jobs
    Unenroll {
        campaign: CampaignId,
        contact: ContactId,
    },
}

#[derive(Subcommand, Debug)]
enum ContactAction {
    /// Add a contact
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        role: Option<String>,
        #[arg(long)]
        company: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },
    /// List all contacts
    List,
}

#[derive(Subcommand, Debug)]
enum JobAction {
    /// List jobs in dispatch order
    List {
        /// Only jobs of this campaign
        #[arg(long)]
        campaign: Option<CampaignId>,
        /// Only jobs in this status (scheduled, sent, failed, skipped)
        #[arg(long)]
        status: Option<JobStatus>,
    },
    /// Reschedule a failed or skipped job for now
    Retry { id: JobId },
}

#[derive(Subcommand, Debug)]
enum SessionAction {
    /// Show the mail session
    Status,
    /// Start an interactive login
    Connect,
    /// Restore a session from a storage state or cookie export file
    Import { file: PathBuf },
    /// End the mail session
    Disconnect,
}

#[derive(Subcommand, Debug)]
enum SystemAction {
    /// Check if the daemon is responding
    Ping,
    /// Get system status
    Status,
    /// Show dashboard counters
    Stats,
    /// Run one dispatcher tick now
    Tick,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let command = build_command(cli.command)?;

    let client = check_control_socket(&cli.control_socket)?;
    let data = client.execute(command).await?;

    match data {
        None => println!("✓ Command completed successfully"),
        Some(data) => print_data(&data),
    }

    Ok(())
}

fn build_command(command: Commands) -> anyhow::Result<RequestCommand> {
    Ok(match command {
        Commands::Campaign { action } => RequestCommand::Campaign(match action {
            CampaignAction::Create { name, steps } => CampaignCommand::Create {
                name,
                templates: read_steps(&steps)?,
            },
            CampaignAction::List => CampaignCommand::List,
            CampaignAction::Show { id } => CampaignCommand::Show { id },
            CampaignAction::Launch { id } => CampaignCommand::Launch { id },
            CampaignAction::Pause { id } => CampaignCommand::Pause { id },
            CampaignAction::Resume { id } => CampaignCommand::Resume { id },
            CampaignAction::Delete { id } => CampaignCommand::Delete { id },
            CampaignAction::Enroll { campaign, contact } => {
                CampaignCommand::Enroll { campaign, contact }
            }
            CampaignAction::Unenroll { campaign, contact } => {
                CampaignCommand::Unenroll { campaign, contact }
            }
        }),
        Commands::Contact { action } => RequestCommand::Contact(match action {
            ContactAction::Add {
                name,
                email,
                role,
                company,
                phone,
                category,
            } => {
                let mut contact = Contact::new(name, email);
                contact.role = role;
                contact.company = company;
                contact.phone = phone;
                contact.category = category;
                ContactCommand::Add(contact)
            }
            ContactAction::List => ContactCommand::List,
        }),
        Commands::Job { action } => RequestCommand::Job(match action {
            JobAction::List { campaign, status } => JobCommand::List { campaign, status },
            JobAction::Retry { id } => JobCommand::Retry { id },
        }),
        Commands::Session { action } => RequestCommand::Session(match action {
            SessionAction::Status => SessionCommand::Status,
            SessionAction::Connect => SessionCommand::Connect,
            SessionAction::Import { file } => SessionCommand::Import {
                artifact: std::fs::read_to_string(&file).map_err(|e| {
                    anyhow::anyhow!("Failed to read session from {}: {e}", file.display())
                })?,
            },
            SessionAction::Disconnect => SessionCommand::Disconnect,
        }),
        Commands::System { action } => RequestCommand::System(match action {
            SystemAction::Ping => SystemCommand::Ping,
            SystemAction::Status => SystemCommand::Status,
            SystemAction::Stats => SystemCommand::Stats,
            SystemAction::Tick => SystemCommand::Tick,
        }),
    })
}

/// Read campaign steps from a RON file, e.g.
///
/// ```ron
/// [
///     (step_number: 1, subject: "Hi {{first_name}}", body: "...", offset_days: Some(0)),
///     (step_number: 2, subject: "Following up", body: "...", offset_days: Some(3)),
/// ]
/// ```
fn read_steps(path: &Path) -> anyhow::Result<Vec<EmailTemplate>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read steps from {}: {e}", path.display()))?;
    ron::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Invalid steps in {}: {e}", path.display()))
}

fn check_control_socket(socket_path: &Path) -> anyhow::Result<ControlClient> {
    let client = ControlClient::new(socket_path);

    if let Err(e) = client.check_socket_exists() {
        anyhow::bail!(
            "Cannot connect to the outreach control socket at {}.\n\
             Error: {e}\n\
             \n\
             Is the outreach daemon running?\n\
             You can configure the socket path with --control-socket or in outreach.config.ron",
            socket_path.display()
        );
    }

    Ok(client)
}

fn print_jobs(jobs: &[EmailJob]) {
    if jobs.is_empty() {
        println!("No jobs");
        return;
    }

    println!(
        "{:<28} {:<5} {:<32} {:<10} {:<24}",
        "JOB ID", "STEP", "RECIPIENT", "STATUS", "SCHEDULED"
    );
    println!("{}", "-".repeat(102));
    for job in jobs {
        println!(
            "{:<28} {:<5} {:<32} {:<10} {:<24}",
            job.id.to_string(),
            job.step_number,
            job.recipient,
            job.status.to_string(),
            format_timestamp(job.scheduled_at)
        );
        if let Some(error) = &job.error_message {
            println!("  → {error}");
        }
    }
    println!("\nTotal: {} job(s)", jobs.len());
}

fn print_data(data: &ResponseData) {
    match data {
        ResponseData::Campaign(campaign) => {
            println!(
                "Campaign {} '{}' is {}",
                campaign.id, campaign.name, campaign.status
            );
        }
        ResponseData::Campaigns(campaigns) => {
            if campaigns.is_empty() {
                println!("No campaigns");
                return;
            }
            println!("{:<28} {:<10} {:<6} {}", "CAMPAIGN ID", "STATUS", "STEPS", "NAME");
            println!("{}", "-".repeat(70));
            for campaign in campaigns {
                println!(
                    "{:<28} {:<10} {:<6} {}",
                    campaign.id.to_string(),
                    campaign.status.to_string(),
                    campaign.templates.len(),
                    campaign.name
                );
            }
            println!("\nTotal: {} campaign(s)", campaigns.len());
        }
        ResponseData::CampaignDetails(details) => print!("{details}"),
        ResponseData::Contact(contact) => {
            println!("Contact {} <{}> [{}]", contact.name, contact.email, contact.id);
        }
        ResponseData::Contacts(contacts) => {
            if contacts.is_empty() {
                println!("No contacts");
                return;
            }
            println!("{:<28} {:<32} {}", "CONTACT ID", "EMAIL", "NAME");
            println!("{}", "-".repeat(80));
            for contact in contacts {
                println!(
                    "{:<28} {:<32} {}",
                    contact.id.to_string(),
                    contact.email,
                    contact.name
                );
            }
            println!("\nTotal: {} contact(s)", contacts.len());
        }
        ResponseData::Job(job) => print_jobs(std::slice::from_ref(job)),
        ResponseData::Jobs(jobs) => print_jobs(jobs),
        ResponseData::Session(status) => {
            println!("=== Mail Session ===\n");
            print!("{status}");
        }
        ResponseData::Stats(stats) => {
            println!("=== Dashboard ===\n");
            println!("Campaigns:        {}", stats.total_campaigns);
            println!("  Active:         {}", stats.active_campaigns);
            println!("  Draft:          {}", stats.draft_campaigns);
            println!("Contacts:         {}", stats.total_contacts);
            println!("Sent today:       {}", stats.emails_sent_today);
            println!("Scheduled:        {}", stats.emails_scheduled);
            println!("Failed:           {}", stats.emails_failed);
            println!("Sent (all time):  {}", stats.total_emails_sent);
        }
        ResponseData::Tick(report) => println!("Tick: {report}"),
        ResponseData::SystemStatus(status) => {
            println!("=== Outreach Status ===\n");
            print!("{status}");
        }
        ResponseData::Message(message) => println!("{message}"),
    }
}

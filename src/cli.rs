use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "campusq",
    about = "A retrieval-based Q&A assistant for campus announcements"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Override the embedding model ID or local model path
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Ask a question and print the assembled answer
    Ask(AskArgs),
    /// Add one announcement to the knowledge base (admin)
    Ingest(IngestArgs),
    /// Bulk-ingest announcements from a JSON file (admin)
    Import(ImportArgs),
    /// Manage user accounts
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Manage the embedding model configuration
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
    /// Show system status and statistics
    Status(StatusArgs),
    /// Start MCP server for AI agent integration
    Mcp,
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Ask --

#[derive(Debug, Parser)]
pub struct AskArgs {
    /// The question to answer
    pub query: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Ingest --

#[derive(Debug, Parser)]
pub struct IngestArgs {
    /// Announcement body text (or use --file)
    pub content: Option<String>,

    /// Read the announcement body from a file
    #[arg(long, conflicts_with = "content")]
    pub file: Option<PathBuf>,

    /// Category: Placements, Events, Academics, Exams, Clubs,
    /// Announcements, or Other
    #[arg(short = 'c', long)]
    pub category: String,

    /// Short label shown alongside the content in answers
    #[arg(short = 't', long)]
    pub title: String,

    /// Department the announcement applies to
    #[arg(long)]
    pub department: Option<String>,

    /// Date the announcement refers to (free-form, e.g. 2025-03-03)
    #[arg(long)]
    pub date: Option<String>,

    #[command(flatten)]
    pub auth: AdminAuth,
}

// -- Import --

#[derive(Debug, Parser)]
pub struct ImportArgs {
    /// JSON file holding an array of {content, category, title, ...} objects
    pub path: PathBuf,

    #[command(flatten)]
    pub auth: AdminAuth,
}

/// Admin credentials required by write commands.
#[derive(Debug, Parser)]
pub struct AdminAuth {
    /// Admin username
    #[arg(long = "admin", value_name = "USERNAME")]
    pub admin: String,

    /// Admin password
    #[arg(id = "admin_password", long = "admin-password")]
    pub password: String,
}

// -- User subcommands --

#[derive(Debug, Subcommand)]
pub enum UserAction {
    /// Create a user account
    Add {
        username: String,
        email: String,
        /// Role: admin or student
        #[arg(long, default_value = "student")]
        role: String,
        #[arg(long)]
        password: String,
        #[command(flatten)]
        auth: AdminAuth,
    },
    /// List all user accounts
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        auth: AdminAuth,
    },
    /// Reset a user's password
    Passwd {
        username: String,
        #[arg(long)]
        password: String,
        #[command(flatten)]
        auth: AdminAuth,
    },
    /// Deactivate a user account
    Deactivate {
        username: String,
        #[command(flatten)]
        auth: AdminAuth,
    },
}

// -- Model --

#[derive(Debug, Subcommand)]
pub enum ModelAction {
    /// Show the currently resolved model
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Persist a default model ID or local path
    Set {
        /// Model ID (HuggingFace) or local path
        model: String,
    },
    /// Clear the stored model setting (revert to default)
    Clear,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "campusq",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn parse_ask_defaults() {
        let cli = Cli::parse_from(["campusq", "ask", "when are exams?"]);
        match cli.command {
            Command::Ask(args) => {
                assert_eq!(args.query, "when are exams?");
                assert!(!args.json);
            }
            _ => panic!("expected ask command"),
        }
    }

    #[test]
    fn parse_ingest_with_metadata() {
        let cli = Cli::parse_from([
            "campusq",
            "ingest",
            "Midterms start March 3rd.",
            "--category",
            "Exams",
            "--title",
            "Midterm Schedule",
            "--department",
            "CSE",
            "--admin",
            "admin",
            "--admin-password",
            "admin123",
        ]);
        match cli.command {
            Command::Ingest(args) => {
                assert_eq!(
                    args.content.as_deref(),
                    Some("Midterms start March 3rd.")
                );
                assert_eq!(args.category, "Exams");
                assert_eq!(args.title, "Midterm Schedule");
                assert_eq!(args.department.as_deref(), Some("CSE"));
                assert_eq!(args.auth.admin, "admin");
            }
            _ => panic!("expected ingest command"),
        }
    }

    #[test]
    fn ingest_content_conflicts_with_file() {
        let result = Cli::try_parse_from([
            "campusq",
            "ingest",
            "inline body",
            "--file",
            "notes.txt",
            "--category",
            "Exams",
            "--title",
            "T",
            "--admin",
            "admin",
            "--admin-password",
            "pw",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_user_add_default_role() {
        let cli = Cli::parse_from([
            "campusq", "user", "add", "alice", "alice@college.edu",
            "--password", "pw", "--admin", "admin", "--admin-password",
            "secret",
        ]);
        match cli.command {
            Command::User {
                action: UserAction::Add { role, .. },
            } => assert_eq!(role, "student"),
            _ => panic!("expected user add command"),
        }
    }
}

use clap::Parser;
use tracing_subscriber::EnvFilter;

use campusq::{
    accounts::{AccountsDb, Role},
    cli::{
        AdminAuth,
        AskArgs,
        Cli,
        Command,
        IngestArgs,
        ModelAction,
        StatusArgs,
        UserAction,
    },
    data_dir::DataDir,
    encoder::{DEFAULT_MODEL_ID, MODEL_ENV_VAR, SentenceEncoder},
    engine::{Engine, IngestRequest, REFUSAL},
    error::{self, Error},
    mcp::{self, DynEngine},
    store::{KnowledgeStore, VectorStore},
};
use kdam::BarExt;

const MODEL_SETTING_KEY: &str = "model_id";

fn init_tracing(verbose: u8) {
    let filter = if let Ok(env) = std::env::var("CAMPUSQ_LOG") {
        EnvFilter::new(env)
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let accounts = AccountsDb::open(&data_dir.accounts_db())?;

    match cli.command {
        Command::Ask(args) => {
            let mut engine =
                build_engine(&data_dir, &accounts, cli.model.as_deref())?;
            cmd_ask(&mut engine, &args)?;
        }
        Command::Ingest(args) => {
            require_admin(&accounts, &args.auth)?;
            let mut engine =
                build_engine(&data_dir, &accounts, cli.model.as_deref())?;
            cmd_ingest(&mut engine, &args)?;
        }
        Command::Import(args) => {
            require_admin(&accounts, &args.auth)?;
            let mut engine =
                build_engine(&data_dir, &accounts, cli.model.as_deref())?;
            cmd_import(&mut engine, &args.path)?;
        }
        Command::User { action } => {
            cmd_user(&accounts, action)?;
        }
        Command::Model { action } => {
            cmd_model(&accounts, cli.model.as_deref(), action)?;
        }
        Command::Status(args) => {
            cmd_status(&data_dir, &accounts, cli.model.as_deref(), &args)?;
        }
        Command::Mcp => {
            let engine =
                build_engine(&data_dir, &accounts, cli.model.as_deref())?;
            mcp::run_mcp(engine)?;
        }
        Command::Completions(args) => {
            args.generate();
        }
    }

    Ok(())
}

/// Model ID resolution order: --model flag, CAMPUSQ_MODEL, the persisted
/// setting, then the built-in default.
fn resolve_model_id(
    accounts: &AccountsDb,
    flag: Option<&str>,
) -> error::Result<String> {
    if let Some(model) = flag {
        return Ok(model.to_string());
    }
    if let Ok(model) = std::env::var(MODEL_ENV_VAR) {
        return Ok(model);
    }
    if let Some(model) = accounts.get_setting(MODEL_SETTING_KEY)? {
        return Ok(model);
    }
    Ok(DEFAULT_MODEL_ID.to_string())
}

fn build_engine(
    data_dir: &DataDir,
    accounts: &AccountsDb,
    model_flag: Option<&str>,
) -> error::Result<DynEngine> {
    let model_id = resolve_model_id(accounts, model_flag)?;
    let encoder = SentenceEncoder::load(&model_id)?;
    let store = KnowledgeStore::open(&data_dir.knowledge_db())?;
    Ok(Engine::new(Box::new(encoder), Box::new(store)))
}

/// Verify credentials and require the admin role.
fn require_admin(accounts: &AccountsDb, auth: &AdminAuth) -> error::Result<()> {
    let user = accounts
        .authenticate(&auth.admin, &auth.password)?
        .ok_or_else(|| {
            Error::Config(format!("invalid credentials for '{}'", auth.admin))
        })?;
    if user.role != Role::Admin {
        return Err(Error::Config(format!(
            "user '{}' is not an admin",
            auth.admin
        )));
    }
    Ok(())
}

fn cmd_ask(engine: &mut DynEngine, args: &AskArgs) -> error::Result<()> {
    let answer = engine.answer(&args.query)?;

    if args.json {
        let out = serde_json::json!({
            "query": args.query,
            "answer": answer,
            "refused": answer == REFUSAL,
        });
        println!("{}", serde_json::to_string(&out)?);
    } else {
        println!("{answer}");
    }
    Ok(())
}

fn cmd_ingest(engine: &mut DynEngine, args: &IngestArgs) -> error::Result<()> {
    let content = match (&args.content, &args.file) {
        (Some(content), None) => content.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)?,
        _ => {
            return Err(Error::Config(
                "provide the announcement body inline or via --file".into(),
            ));
        }
    };
    if args.title.trim().is_empty() {
        return Err(Error::Config("title must not be empty".into()));
    }

    let request = IngestRequest {
        content,
        category: args.category.parse()?,
        title: args.title.clone(),
        department: args.department.clone(),
        date: args.date.clone(),
    };

    if engine.ingest(&request) {
        println!("Added '{}' to {}", request.title, request.category);
        Ok(())
    } else {
        Err(Error::Config("failed to add information".into()))
    }
}

fn cmd_import(
    engine: &mut DynEngine,
    path: &std::path::Path,
) -> error::Result<()> {
    let raw = std::fs::read_to_string(path)?;
    let requests: Vec<IngestRequest> = serde_json::from_str(&raw)?;

    if requests.is_empty() {
        eprintln!("Nothing to import.");
        return Ok(());
    }

    let mut bar = kdam::tqdm!(total = requests.len(), desc = "importing");
    let mut added = 0usize;
    let mut failed = 0usize;

    for request in &requests {
        if engine.ingest(request) {
            added += 1;
        } else {
            failed += 1;
        }
        let _ = bar.update(1);
    }
    eprintln!();

    println!("Imported {added} announcement(s), {failed} failed");
    if failed > 0 {
        return Err(Error::Config(format!(
            "{failed} of {} entries failed to import",
            requests.len()
        )));
    }
    Ok(())
}

fn cmd_user(accounts: &AccountsDb, action: UserAction) -> error::Result<()> {
    match action {
        UserAction::Add {
            username,
            email,
            role,
            password,
            auth,
        } => {
            require_admin(accounts, &auth)?;
            let role: Role = role.parse()?;
            accounts.create_user(&username, &email, role, &password)?;
            println!("Created {role} account '{username}'");
        }
        UserAction::List { json, auth } => {
            require_admin(accounts, &auth)?;
            let users = accounts.list_users()?;
            if json {
                println!("{}", serde_json::to_string(&users)?);
            } else {
                for u in &users {
                    let status = if u.is_active { "active" } else { "inactive" };
                    println!(
                        "{}\t{}\t{}\t{}\t{}",
                        u.username,
                        u.email,
                        u.role,
                        status,
                        u.created_at.format("%Y-%m-%d")
                    );
                }
                println!("\n{} user(s)", users.len());
            }
        }
        UserAction::Passwd {
            username,
            password,
            auth,
        } => {
            require_admin(accounts, &auth)?;
            accounts.set_password(&username, &password)?;
            println!("Password updated for '{username}'");
        }
        UserAction::Deactivate { username, auth } => {
            require_admin(accounts, &auth)?;
            accounts.deactivate_user(&username)?;
            println!("Deactivated '{username}'");
        }
    }
    Ok(())
}

fn cmd_model(
    accounts: &AccountsDb,
    model_flag: Option<&str>,
    action: ModelAction,
) -> error::Result<()> {
    match action {
        ModelAction::Show { json } => {
            let resolved = resolve_model_id(accounts, model_flag)?;
            let stored = accounts.get_setting(MODEL_SETTING_KEY)?;
            if json {
                let out = serde_json::json!({
                    "resolved": resolved,
                    "stored": stored,
                    "default": DEFAULT_MODEL_ID,
                });
                println!("{}", serde_json::to_string(&out)?);
            } else {
                println!("Model: {resolved}");
                if let Some(stored) = stored {
                    println!("Stored setting: {stored}");
                }
            }
        }
        ModelAction::Set { model } => {
            accounts.set_setting(MODEL_SETTING_KEY, &model)?;
            println!("Default model set to '{model}'");
        }
        ModelAction::Clear => {
            if accounts.remove_setting(MODEL_SETTING_KEY)? {
                println!("Cleared stored model setting");
            } else {
                println!("No stored model setting");
            }
        }
    }
    Ok(())
}

fn cmd_status(
    data_dir: &DataDir,
    accounts: &AccountsDb,
    model_flag: Option<&str>,
    args: &StatusArgs,
) -> error::Result<()> {
    let store = KnowledgeStore::open(&data_dir.knowledge_db())?;
    let stats = store.stats()?;
    let user_count = accounts.list_users()?.len();
    let model = resolve_model_id(accounts, model_flag)?;

    if args.json {
        let out = serde_json::json!({
            "data_dir": data_dir.root().display().to_string(),
            "model": model,
            "documents": stats.count,
            "dimension": stats.dimension,
            "users": user_count,
        });
        println!("{}", serde_json::to_string(&out)?);
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!("Model: {model}");
        println!("Documents: {}", stats.count);
        match stats.dimension {
            Some(d) => println!("Embedding dimension: {d}"),
            None => println!("Embedding dimension: (store empty)"),
        }
        println!("Users: {user_count}");
    }
    Ok(())
}

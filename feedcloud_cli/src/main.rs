//! Admin command line: database setup and user management.

use clap::{Parser, Subcommand};
use diesel::prelude::*;

use feedcloud_core::model::NewUser;
use feedcloud_core::{auth, database, Result, Settings};

const DEFAULT_ADMIN_USER: &str = "admin";

#[derive(Parser)]
#[command(name = "feedcloud", about = "FeedCloud administration")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage the database schema.
    Database {
        #[command(subcommand)]
        command: DatabaseCommand,
    },
    /// Manage users.
    User {
        #[command(subcommand)]
        command: UserCommand,
    },
}

#[derive(Subcommand)]
enum DatabaseCommand {
    /// Create all tables.
    Init {
        /// Drop all existing tables and data first.
        #[arg(long)]
        delete_all: bool,
    },
}

#[derive(Subcommand)]
enum UserCommand {
    /// Create a new user.
    Create {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
    },
    /// Create the default root user.
    CreateRoot,
}

fn main() {
    dotenvy::dotenv().ok();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let settings = Settings::from_env()?;
    let mut conn = SqliteConnection::establish(&settings.database_url)?;

    match cli.command {
        Command::Database {
            command: DatabaseCommand::Init { delete_all },
        } => {
            if delete_all {
                println!("Deleting all existing tables and data...");
                database::drop_all(&mut conn)?;
            }
            println!("Creating tables...");
            database::create_all(&mut conn)?;
            println!("Done");
        }
        Command::User {
            command: UserCommand::Create { username, password },
        } => create_user(&mut conn, &username, &password, false)?,
        Command::User {
            command: UserCommand::CreateRoot,
        } => create_user(&mut conn, DEFAULT_ADMIN_USER, DEFAULT_ADMIN_USER, true)?,
    }
    Ok(())
}

fn create_user(conn: &mut SqliteConnection, username: &str, password: &str, is_admin: bool) -> Result<()> {
    use feedcloud_core::schema::user;

    let existing: i64 = user::table
        .filter(user::username.eq(username))
        .count()
        .get_result(conn)?;
    if existing != 0 {
        println!("User '{}' already exists.", username);
        return Ok(());
    }

    diesel::insert_into(user::table)
        .values(NewUser {
            username: username.to_string(),
            password_hash: auth::hash_password(password)?,
            is_admin,
        })
        .execute(conn)?;
    println!("Created user '{}'.", username);
    Ok(())
}

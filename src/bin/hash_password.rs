use clap::Parser;
use sentiment_portal::login::hash_password;
use std::io::{self, BufRead};

/// Print the SHA-256 digest of a password for the `[[users]]` config table
#[derive(Parser, Debug)]
#[command(name = "hash-password")]
struct Args {
    /// Password to hash; read from stdin when omitted
    password: Option<String>,

    /// Username to emit a ready-to-paste config entry for
    #[arg(short, long)]
    username: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let password = match args.password {
        Some(password) => password,
        None => {
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };

    if password.is_empty() {
        return Err("password must not be empty".into());
    }

    let hash = hash_password(&password);
    match args.username {
        Some(username) => {
            println!("[[users]]");
            println!("username = \"{}\"", username);
            println!("password_hash = \"{}\"", hash);
        }
        None => println!("{}", hash),
    }

    Ok(())
}

//! KVDB CLI Client
//!
//! One command per invocation over a single TCP stream, written then read
//! sequentially. Admin commands go to the manager port; point it there
//! with `--server 127.0.0.1:7060`.

use std::io::BufReader;
use std::net::TcpStream;
use std::time::Duration;

use clap::{Parser, Subcommand};

use kvdb::config::DEFAULT_MAX_FRAME_BYTES;
use kvdb::protocol::{codec, read_frame, write_frame, Command, Message, Response};

/// KVDB CLI
#[derive(Parser, Debug)]
#[command(name = "kvdb-cli")]
#[command(about = "CLI for the KVDB key-value server")]
#[command(version)]
struct Args {
    /// Server address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:7078")]
    server: String,

    /// Bind the session to this database before running the command
    #[arg(short, long)]
    db: Option<String>,

    /// Connection timeout in milliseconds
    #[arg(short, long, default_value = "5000")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get values by key
    Get { keys: Vec<String> },

    /// Put key/value pairs: k1 v1 [k2 v2 ...]
    Put { kvs: Vec<String> },

    /// Check which keys exist
    Exists { keys: Vec<String> },

    /// Create a database (manager port)
    CreateDb { name: String },

    /// Enable a database (manager port)
    EnableDb { name: String },

    /// Disable a database (manager port)
    DisableDb { name: String },

    /// List enabled databases (manager port)
    ShowDbs,

    /// Print the cluster descriptor
    ClusterInfo,
}

fn main() {
    let args = Args::parse();

    let addr = match args.server.parse() {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("invalid server address {}: {}", args.server, e);
            std::process::exit(1);
        }
    };
    let timeout = Duration::from_millis(args.timeout);
    let mut stream = match TcpStream::connect_timeout(&addr, timeout) {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("failed to connect to {}: {}", args.server, e);
            std::process::exit(1);
        }
    };
    let _ = stream.set_read_timeout(Some(timeout));
    let _ = stream.set_write_timeout(Some(timeout));
    let _ = stream.set_nodelay(true);

    let mut requests = Vec::new();
    if let Some(db) = &args.db {
        requests.push(Command::use_db(db));
    }
    requests.push(to_command(&args.command));

    // Sequential write-then-read on one stream; responses arrive in
    // request order.
    let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
    for (id, command) in requests.into_iter().enumerate() {
        let request = Message::request(id as u64, command);
        if let Err(e) = write_frame(&mut stream, &codec::encode_message(&request)) {
            eprintln!("failed to send command: {}", e);
            std::process::exit(1);
        }

        let response = match read_response(&mut reader) {
            Ok(response) => response,
            Err(e) => {
                eprintln!("failed to read response: {}", e);
                std::process::exit(1);
            }
        };
        if !response.is_success() {
            eprintln!("ERROR: {}", response.message);
            std::process::exit(1);
        }
        if id > 0 || args.db.is_none() {
            print_result(&args.command, &response);
        }
    }
}

fn to_command(command: &Commands) -> Command {
    let bytes = |s: &String| s.as_bytes().to_vec();
    match command {
        Commands::Get { keys } => Command::get(keys.iter().map(bytes).collect()),
        Commands::Put { kvs } => Command::put(kvs.iter().map(bytes).collect()),
        Commands::Exists { keys } => Command::exists(keys.iter().map(bytes).collect()),
        Commands::CreateDb { name } => Command::create_db(name),
        Commands::EnableDb { name } => Command::enable_db(name),
        Commands::DisableDb { name } => Command::disable_db(name),
        Commands::ShowDbs => Command::show_dbs(),
        Commands::ClusterInfo => Command::cluster_info(),
    }
}

fn read_response(reader: &mut BufReader<TcpStream>) -> kvdb::Result<Response> {
    let payload = read_frame(reader, DEFAULT_MAX_FRAME_BYTES)?
        .ok_or_else(|| kvdb::KvdbError::Decode("server closed the connection".to_string()))?;
    let message = codec::decode_message(&payload)?;
    message
        .as_response()
        .cloned()
        .ok_or_else(|| kvdb::KvdbError::Decode("server sent a request".to_string()))
}

fn print_result(command: &Commands, response: &Response) {
    match command {
        Commands::Get { .. } => {
            for entry in &response.result {
                match entry {
                    Some(value) => println!("{}", String::from_utf8_lossy(value)),
                    None => println!("(null)"),
                }
            }
        }
        Commands::Exists { .. } => {
            for entry in &response.result {
                let present = matches!(entry.as_deref(), Some([1]));
                println!("{}", present as u8);
            }
        }
        Commands::ShowDbs => {
            for entry in response.result.iter().flatten() {
                println!("{}", String::from_utf8_lossy(entry));
            }
        }
        Commands::ClusterInfo => match response.result.first().and_then(|e| e.as_deref()) {
            Some(blob) => match codec::decode_cluster_info(blob) {
                Ok(cluster) => {
                    for (db, urls) in cluster {
                        println!("{}: {}", db, urls.join(", "));
                    }
                }
                Err(e) => eprintln!("undecodable descriptor: {}", e),
            },
            None => println!("(no clustered databases)"),
        },
        Commands::Put { .. }
        | Commands::CreateDb { .. }
        | Commands::EnableDb { .. }
        | Commands::DisableDb { .. } => println!("OK"),
    }
}

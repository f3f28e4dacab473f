mod dfs;
mod net;
mod store;

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use dfs::client::ClientSession;
use dfs::errors::DfsError;
use dfs::replica_name;
use dfs::server::{bootstrap_cluster, ClusterConfig};
use net::Registry;

const DEFAULT_REPLICA_COUNT: u32 = 3;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.iter().skip(1).any(|a| a == "help" || a == "--help") {
        print_usage();
        return;
    }

    let replica_count = match args.get(1) {
        None => DEFAULT_REPLICA_COUNT,
        Some(raw) => match raw.parse::<u32>() {
            Ok(n) if n >= 1 => n,
            _ => {
                print_usage();
                process::exit(2);
            }
        },
    };
    let storage_root = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(|| env::temp_dir().join("mirrorfs"));

    let registry = Arc::new(Registry::new());
    let config = ClusterConfig {
        replica_count,
        storage_root,
    };

    let _services = match bootstrap_cluster(&registry, &config) {
        Ok(services) => services,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };
    let client = match ClientSession::connect(&registry) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    println!(
        "mirrorfs: {} replicas under {}",
        replica_count,
        config.storage_root.display()
    );
    print_commands();
    run_shell(&client, &registry, replica_count);
}

fn print_usage() {
    eprintln!("Usage: mirrorfs [replica-count] [storage-root]");
    eprintln!(
        "  replica-count  number of replica nodes (default {})",
        DEFAULT_REPLICA_COUNT
    );
    eprintln!("  storage-root   directory holding each replica's tree (default under the temp dir)");
}

fn print_commands() {
    println!("Commands:");
    println!("  create <path>                new file ('path' includes the file name)");
    println!("  write <path> <content..>     write content to the file at 'path'");
    println!("  read <path>                  print the file at 'path'");
    println!("  rm <path>                    remove a file or an empty directory");
    println!("  move <source> <target>       move a file");
    println!("  rename <path> <new-name>     rename a file in place");
    println!("  mkdir <path>                 create a directory");
    println!("  ls <path>                    list a directory");
    println!("  kill <replica-id>            take one replica down (to watch the protocol cope)");
    println!("  help                         show this list");
    println!("  exit                         quit");
}

fn run_shell(client: &ClientSession, registry: &Registry, replica_count: u32) {
    let stdin = io::stdin();
    loop {
        print!("> ");
        let _ = io::stdout().flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&command) = tokens.first() else {
            continue;
        };

        match command {
            "create" => match tokens.get(1) {
                Some(path) => report(client.create_file(path)),
                None => println!("usage: create <path>"),
            },
            "write" => {
                if tokens.len() < 3 {
                    println!("usage: write <path> <content..>");
                    continue;
                }
                let content = tokens[2..].join(" ");
                report(client.write_file(tokens[1], content.as_bytes()));
            }
            "read" => match tokens.get(1) {
                Some(path) => match client.read_file(path) {
                    Ok(bytes) => println!("{}", String::from_utf8_lossy(&bytes)),
                    Err(e) => fail(&e),
                },
                None => println!("usage: read <path>"),
            },
            "rm" => match tokens.get(1) {
                Some(path) => report(client.remove(path)),
                None => println!("usage: rm <path>"),
            },
            "move" => {
                if tokens.len() < 3 {
                    println!("usage: move <source> <target>");
                    continue;
                }
                report(client.move_file(tokens[1], tokens[2]));
            }
            "rename" => {
                if tokens.len() < 3 {
                    println!("usage: rename <path> <new-name>");
                    continue;
                }
                report(client.rename_file(tokens[1], tokens[2]));
            }
            "mkdir" => match tokens.get(1) {
                Some(path) => report(client.create_directory(path)),
                None => println!("usage: mkdir <path>"),
            },
            "ls" => match tokens.get(1) {
                Some(path) => match client.list_directory(path) {
                    Ok(entries) => {
                        for entry in entries {
                            println!("{}", entry);
                        }
                    }
                    Err(e) => fail(&e),
                },
                None => println!("usage: ls <path>"),
            },
            "kill" => match tokens.get(1).and_then(|raw| raw.parse::<u32>().ok()) {
                Some(id) if id < replica_count => {
                    registry.kill(&replica_name(id));
                    println!("replica {} is now down", id);
                }
                _ => println!("usage: kill <replica-id> (0..{})", replica_count),
            },
            "help" => print_commands(),
            "exit" => break,
            other => println!("unknown command `{}`, try `help`", other),
        }
    }
}

fn report(result: Result<(), DfsError>) {
    match result {
        Ok(()) => println!("ok"),
        Err(e) => fail(&e),
    }
}

fn fail(e: &DfsError) {
    println!("--> {}", e);
    if e.is_fatal() {
        process::exit(1);
    }
}

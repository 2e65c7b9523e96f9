use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use prettytable::{Table, row};

use rmstore::{
    BUFFER_POOL_SIZE, BufferManager, PagedFileManager, RecordFileHandle, RecordFileOptions,
    RecordManager, Rid,
};

#[derive(Parser)]
#[command(name = "rmstore", about = "Fixed-length record files")]
struct Cli {
    /// Frames in the buffer pool
    #[arg(long, global = true, default_value_t = BUFFER_POOL_SIZE)]
    pool_size: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an empty record file
    Create {
        path: PathBuf,
        #[arg(long)]
        record_size: usize,
        #[arg(long)]
        records_per_page: Option<usize>,
    },
    /// Insert a record; the text is zero-padded to the record size
    Insert { path: PathBuf, text: String },
    Get {
        path: PathBuf,
        page: usize,
        slot: usize,
    },
    Delete {
        path: PathBuf,
        page: usize,
        slot: usize,
    },
    /// List every record in scan order
    Scan { path: PathBuf },
    /// Per-page occupancy and the free list
    Inspect {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Exit with an error if any invariant is broken
    Check { path: PathBuf },
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let pool = BufferManager::with_capacity(PagedFileManager::new(), cli.pool_size).into_shared();
    let manager = RecordManager::new(pool);

    match cli.command {
        Command::Create {
            path,
            record_size,
            records_per_page,
        } => {
            let mut options = RecordFileOptions::new(record_size);
            if let Some(n) = records_per_page {
                options = options.with_records_per_page(n);
            }
            manager.create_file(&path, options)?;
            println!("created {}", path.display());
        }
        Command::Insert { path, text } => {
            let mut file = manager.open_file(&path)?;
            let data = pad_record(&text, file.record_size())?;
            let rid = file.insert_record(&data)?;
            manager.close_file(file)?;
            println!("{}", rid);
        }
        Command::Get { path, page, slot } => {
            let file = manager.open_file(&path)?;
            let data = file.get_record(Rid::new(page, slot))?;
            manager.close_file(file)?;
            println!("{}", display_record(&data));
        }
        Command::Delete { path, page, slot } => {
            let mut file = manager.open_file(&path)?;
            file.delete_record(Rid::new(page, slot))?;
            manager.close_file(file)?;
        }
        Command::Scan { path } => {
            let file = manager.open_file(&path)?;
            print_records(&file)?;
            manager.close_file(file)?;
        }
        Command::Inspect { path, json } => {
            let file = manager.open_file(&path)?;
            let report = file.inspect()?;
            manager.close_file(file)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                let mut table = Table::new();
                table.set_titles(row!["page", "records", "occupied", "next free", "free list"]);
                for page in &report.pages {
                    let next_free = page
                        .next_free_page_no
                        .map_or_else(|| "-".to_string(), |p| p.to_string());
                    let listed = if page.in_free_list { "yes" } else { "no" };
                    table.add_row(row![
                        page.page_no,
                        page.num_records,
                        page.occupied,
                        next_free,
                        listed
                    ]);
                }
                table.printstd();
                println!(
                    "{} records in {} pages, free list {:?}",
                    report.record_count(),
                    report.header.num_pages,
                    report.free_list
                );
            }
        }
        Command::Check { path } => {
            let file = manager.open_file(&path)?;
            let checked = file.check_invariants();
            manager.close_file(file)?;
            checked?;
            println!("ok");
        }
    }

    Ok(())
}

fn pad_record(text: &str, record_size: usize) -> Result<Vec<u8>, Box<dyn Error>> {
    let bytes = text.as_bytes();
    if bytes.len() > record_size {
        return Err(format!(
            "record is {} bytes but the file holds {} byte records",
            bytes.len(),
            record_size
        )
        .into());
    }

    let mut data = vec![0u8; record_size];
    data[..bytes.len()].copy_from_slice(bytes);
    Ok(data)
}

fn display_record(data: &[u8]) -> String {
    let end = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    String::from_utf8_lossy(&data[..end]).into_owned()
}

fn print_records(file: &RecordFileHandle) -> Result<(), Box<dyn Error>> {
    let mut table = Table::new();
    table.set_titles(row!["rid", "record"]);

    for rid in file.scan()? {
        let rid = rid?;
        let text = display_record(&file.get_record(rid)?);
        table.add_row(row![rid, text]);
    }

    table.printstd();
    Ok(())
}

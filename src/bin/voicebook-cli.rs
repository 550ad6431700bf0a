use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use uuid::Uuid;

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use voicebook::cli::RecognizerArgs;
use voicebook::logging::{LogFormat, init_with};
use voicebook::{AudioLocation, Library, ProcessRecognizer, Transcriber};

fn main() -> Result<()> {
    init_with(LogFormat::Compact, LevelFilter::WARN);
    let params = get_params()?;
    let library = Library::open(&params.books_dir)
        .with_context(|| format!("failed to open {}", params.books_dir.display()))?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    run(&library, params.command, &mut out)?;
    out.flush()?;
    Ok(())
}

#[derive(Parser, Debug)]
#[command(name = "voicebook")]
#[command(about = "Offline access to a voicebook library")]
struct Params {
    /// Directory holding one sub-directory per book.
    #[arg(long = "books-dir", env = "VOICEBOOK_BOOKS_DIR", default_value = "books")]
    books_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List books with their chapters.
    Books,

    /// Create an empty book.
    NewBook {
        #[arg(long)]
        title: String,

        #[arg(long, default_value = "")]
        author: String,
    },

    /// Append a chapter to a book.
    AddChapter {
        #[arg(long)]
        book: Uuid,

        #[arg(long)]
        title: String,
    },

    /// Print a chapter's full text.
    Text {
        #[arg(long)]
        book: Uuid,

        #[arg(long)]
        chapter: Uuid,
    },

    /// Run the recognizer over a paragraph's recording and store the transcript.
    Recognize {
        #[arg(long)]
        book: Uuid,

        #[arg(long)]
        chapter: Uuid,

        #[arg(long)]
        paragraph: Uuid,

        #[command(flatten)]
        recognizer: RecognizerArgs,
    },
}

fn get_params() -> Result<Params> {
    Ok(Params::parse())
}

fn run<W: Write>(library: &Library, command: Command, out: &mut W) -> Result<()> {
    match command {
        Command::Books => {
            for book in library.list_books()? {
                writeln!(out, "{}\t{}\t{}", book.id, book.title, book.author)?;
                for chapter in &book.chapters {
                    writeln!(out, "  {}\t{}", chapter.id, chapter.title)?;
                }
            }
        }
        Command::NewBook { title, author } => {
            let book = library.create_book(&title, &author)?;
            writeln!(out, "{}", book.id)?;
        }
        Command::AddChapter { book, title } => {
            let mut book = library
                .load_book(book)?
                .ok_or_else(|| anyhow!("book {book} not found"))?;
            let entry = library.add_chapter(&mut book, &title)?;
            writeln!(out, "{}", entry.id)?;
        }
        Command::Text { book, chapter } => {
            let chapter = library
                .load_chapter(book, chapter)?
                .ok_or_else(|| anyhow!("chapter {chapter} not found in book {book}"))?;
            writeln!(out, "{}", chapter.full_text())?;
        }
        Command::Recognize {
            book,
            chapter,
            paragraph,
            recognizer,
        } => {
            let doc = library
                .load_chapter(book, chapter)?
                .ok_or_else(|| anyhow!("chapter {chapter} not found in book {book}"))?;
            let filename = doc
                .paragraph(paragraph)
                .ok_or_else(|| anyhow!("paragraph {paragraph} not found"))?
                .audio
                .clone()
                .ok_or_else(|| anyhow!("paragraph {paragraph} has no recording"))?;

            let location = AudioLocation {
                book_id: book,
                chapter_id: chapter,
                paragraph_id: paragraph,
                filename,
            };
            let recognizer = ProcessRecognizer::new(recognizer.to_opts());
            let transcription = Transcriber::new(library, &recognizer)
                .transcribe(&location, None)
                .context("recognition failed")?;
            writeln!(out, "{}", transcription.text)?;
        }
    }
    Ok(())
}

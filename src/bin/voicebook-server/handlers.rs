//! Route handlers. Every blocking library call runs on the blocking pool.

use std::path::PathBuf;
use std::time::Instant;

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::io::ReaderStream;
use tracing::info;
use uuid::Uuid;

use voicebook::assets::audio_filename;
use voicebook::paragraph::END_PARAGRAPH_ID;
use voicebook::{
    Book, ChapterEntry, Direction, Entity, Error, Paragraph, RegularParagraph, Transcriber,
    timestamp,
};

use crate::{AppError, AppState, metrics};

type ApiResult<T> = std::result::Result<T, AppError>;

#[derive(Debug, Serialize)]
pub(crate) struct Success<T> {
    success: bool,
    #[serde(flatten)]
    body: T,
}

fn ok<T: Serialize>(body: T) -> Json<Success<T>> {
    Json(Success {
        success: true,
        body,
    })
}

#[derive(Debug, Serialize)]
pub(crate) struct Empty {}

#[derive(Debug, Serialize)]
pub(crate) struct BooksBody {
    books: Vec<Book>,
}

#[derive(Debug, Serialize)]
pub(crate) struct BookBody {
    book: Book,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChapterBody {
    chapter: ChapterEntry,
}

#[derive(Debug, Serialize)]
pub(crate) struct ParagraphsBody {
    paragraphs: Vec<Paragraph>,
    full_text: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ParagraphBody {
    paragraph: RegularParagraph,
    #[serde(skip_serializing_if = "Option::is_none")]
    full_text: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct FullTextBody {
    full_text: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct UploadBody {
    paragraph: RegularParagraph,
    audio_path: String,
    start_time: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RecognizeBody {
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    transcribe_delay: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct BookRequest {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ChapterRequest {
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AddParagraphRequest {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    after_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct UpdateParagraphRequest {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RecognizeRequest {
    #[serde(default)]
    audio_path: Option<String>,
    #[serde(default)]
    start_time: Option<Value>,
}

async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> voicebook::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| AppError::internal(format!("worker task failed: {err}")))?
        .map_err(AppError::from)
}

/// Ids that don't parse can't name anything, so they are reported as missing.
fn parse_id(raw: &str, entity: Entity) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| Error::NotFound(entity).into())
}

/// `after_id` is optional; the sentinel's id or anything unparsable means "append".
fn parse_after_id(raw: Option<&str>) -> Option<Uuid> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty() && *s != END_PARAGRAPH_ID)
        .and_then(|s| Uuid::parse_str(s).ok())
}

/// Milliseconds since the epoch, sent either as a JSON number or a numeric string.
fn parse_start_time(raw: Option<&Value>) -> Option<f64> {
    match raw? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|ms| ms.is_finite())
}

fn content_type_for(filename: &str) -> HeaderValue {
    let ext = filename.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    let value = match ext.as_deref() {
        Some("wav") => "audio/wav",
        Some("json") => "application/json",
        Some("txt") | Some("srt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    };
    HeaderValue::from_static(value)
}

// ---------------------------------------------------------------------
// Books
// ---------------------------------------------------------------------

pub(crate) async fn list_books(State(state): State<AppState>) -> ApiResult<Json<Success<BooksBody>>> {
    let library = state.library.clone();
    let books = blocking(move || library.list_books()).await?;
    Ok(ok(BooksBody { books }))
}

pub(crate) async fn new_book(
    State(state): State<AppState>,
    payload: Result<Json<BookRequest>, JsonRejection>,
) -> ApiResult<Json<Success<BookBody>>> {
    let Json(req) = payload?;
    let title = req
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| "Untitled book".to_owned());
    let author = req.author.unwrap_or_default();

    let library = state.library.clone();
    let book = blocking(move || library.create_book(&title, &author)).await?;
    Ok(ok(BookBody { book }))
}

pub(crate) async fn get_book(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
) -> ApiResult<Json<Success<BookBody>>> {
    let book_id = parse_id(&book_id, Entity::Book)?;
    let library = state.library.clone();
    let book = blocking(move || {
        library
            .load_book(book_id)?
            .ok_or(Error::NotFound(Entity::Book))
    })
    .await?;
    Ok(ok(BookBody { book }))
}

pub(crate) async fn update_book(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
    payload: Result<Json<BookRequest>, JsonRejection>,
) -> ApiResult<Json<Success<BookBody>>> {
    let book_id = parse_id(&book_id, Entity::Book)?;
    let Json(req) = payload?;

    let library = state.library.clone();
    let book = blocking(move || {
        library
            .update_book(book_id, req.title.as_deref(), req.author.as_deref())?
            .ok_or(Error::NotFound(Entity::Book))
    })
    .await?;
    Ok(ok(BookBody { book }))
}

pub(crate) async fn delete_book(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
) -> ApiResult<Json<Success<Empty>>> {
    let book_id = parse_id(&book_id, Entity::Book)?;
    let library = state.library.clone();
    blocking(move || match library.delete_book(book_id)? {
        true => Ok(()),
        false => Err(Error::NotFound(Entity::Book)),
    })
    .await?;
    Ok(ok(Empty {}))
}

// ---------------------------------------------------------------------
// Chapters
// ---------------------------------------------------------------------

pub(crate) async fn new_chapter(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
    payload: Result<Json<ChapterRequest>, JsonRejection>,
) -> ApiResult<Json<Success<ChapterBody>>> {
    let book_id = parse_id(&book_id, Entity::Book)?;
    let Json(req) = payload?;
    let title = req
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| "New chapter".to_owned());

    let library = state.library.clone();
    let chapter = blocking(move || {
        let mut book = library
            .load_book(book_id)?
            .ok_or(Error::NotFound(Entity::Book))?;
        library.add_chapter(&mut book, &title)
    })
    .await?;
    Ok(ok(ChapterBody { chapter }))
}

pub(crate) async fn update_chapter(
    State(state): State<AppState>,
    Path((book_id, chapter_id)): Path<(String, String)>,
    payload: Result<Json<ChapterRequest>, JsonRejection>,
) -> ApiResult<Json<Success<ChapterBody>>> {
    let book_id = parse_id(&book_id, Entity::Book)?;
    let chapter_id = parse_id(&chapter_id, Entity::Chapter)?;
    let Json(req) = payload?;
    let title = req.title.unwrap_or_default();

    let library = state.library.clone();
    let chapter = blocking(move || {
        let mut book = library
            .load_book(book_id)?
            .ok_or(Error::NotFound(Entity::Book))?;
        library
            .rename_chapter(&mut book, chapter_id, &title)?
            .ok_or(Error::NotFound(Entity::Chapter))
    })
    .await?;
    Ok(ok(ChapterBody { chapter }))
}

pub(crate) async fn delete_chapter(
    State(state): State<AppState>,
    Path((book_id, chapter_id)): Path<(String, String)>,
) -> ApiResult<Json<Success<Empty>>> {
    let book_id = parse_id(&book_id, Entity::Book)?;
    let chapter_id = parse_id(&chapter_id, Entity::Chapter)?;

    let library = state.library.clone();
    blocking(move || {
        let mut book = library
            .load_book(book_id)?
            .ok_or(Error::NotFound(Entity::Book))?;
        match library.delete_chapter(&mut book, chapter_id)? {
            true => Ok(()),
            false => Err(Error::NotFound(Entity::Chapter)),
        }
    })
    .await?;
    Ok(ok(Empty {}))
}

// ---------------------------------------------------------------------
// Paragraphs
// ---------------------------------------------------------------------

pub(crate) async fn get_paragraphs(
    State(state): State<AppState>,
    Path((book_id, chapter_id)): Path<(String, String)>,
) -> ApiResult<Json<Success<ParagraphsBody>>> {
    let book_id = parse_id(&book_id, Entity::Book)?;
    let chapter_id = parse_id(&chapter_id, Entity::Chapter)?;

    let library = state.library.clone();
    let chapter = blocking(move || {
        library
            .load_chapter(book_id, chapter_id)?
            .ok_or(Error::NotFound(Entity::Chapter))
    })
    .await?;

    Ok(ok(ParagraphsBody {
        full_text: chapter.full_text(),
        paragraphs: chapter.paragraphs().to_vec(),
    }))
}

pub(crate) async fn add_paragraph(
    State(state): State<AppState>,
    Path((book_id, chapter_id)): Path<(String, String)>,
    payload: Result<Json<AddParagraphRequest>, JsonRejection>,
) -> ApiResult<Json<Success<ParagraphsBody>>> {
    let book_id = parse_id(&book_id, Entity::Book)?;
    let chapter_id = parse_id(&chapter_id, Entity::Chapter)?;
    let Json(req) = payload?;
    let text = req.text.unwrap_or_default();
    let after = parse_after_id(req.after_id.as_deref());

    let library = state.library.clone();
    let (chapter, _) = blocking(move || {
        library
            .edit_chapter(book_id, chapter_id, |chapter, _| {
                Ok(chapter.add_paragraph(text, after))
            })?
            .ok_or(Error::NotFound(Entity::Chapter))
    })
    .await?;

    Ok(ok(ParagraphsBody {
        full_text: chapter.full_text(),
        paragraphs: chapter.paragraphs().to_vec(),
    }))
}

pub(crate) async fn update_paragraph(
    State(state): State<AppState>,
    Path((book_id, chapter_id)): Path<(String, String)>,
    payload: Result<Json<UpdateParagraphRequest>, JsonRejection>,
) -> ApiResult<Json<Success<ParagraphBody>>> {
    let book_id = parse_id(&book_id, Entity::Book)?;
    let chapter_id = parse_id(&chapter_id, Entity::Chapter)?;
    let Json(req) = payload?;
    let (Some(id), Some(text)) = (req.id, req.text) else {
        return Err(AppError::bad_request("paragraph id and text are required"));
    };
    let paragraph_id = parse_id(&id, Entity::Paragraph)?;

    let library = state.library.clone();
    let (chapter, paragraph) = blocking(move || {
        library
            .edit_chapter(book_id, chapter_id, |chapter, _| {
                chapter
                    .update_paragraph(paragraph_id, text)
                    .cloned()
                    .ok_or(Error::NotFound(Entity::Paragraph))
            })?
            .ok_or(Error::NotFound(Entity::Chapter))
    })
    .await?;

    Ok(ok(ParagraphBody {
        paragraph,
        full_text: Some(chapter.full_text()),
    }))
}

pub(crate) async fn delete_paragraph(
    State(state): State<AppState>,
    Path((book_id, chapter_id, paragraph_id)): Path<(String, String, String)>,
) -> ApiResult<Json<Success<FullTextBody>>> {
    let book_id = parse_id(&book_id, Entity::Book)?;
    let chapter_id = parse_id(&chapter_id, Entity::Chapter)?;
    let paragraph_id = parse_id(&paragraph_id, Entity::Paragraph)?;

    let library = state.library.clone();
    let (chapter, _) = blocking(move || {
        library
            .edit_chapter(book_id, chapter_id, |chapter, assets| {
                match chapter.delete_paragraph(paragraph_id, assets)? {
                    true => Ok(()),
                    false => Err(Error::NotFound(Entity::Paragraph)),
                }
            })?
            .ok_or(Error::NotFound(Entity::Chapter))
    })
    .await?;

    Ok(ok(FullTextBody {
        full_text: chapter.full_text(),
    }))
}

pub(crate) async fn move_paragraph(
    State(state): State<AppState>,
    Path((book_id, chapter_id, paragraph_id, direction)): Path<(String, String, String, String)>,
) -> ApiResult<Json<Success<ParagraphsBody>>> {
    let book_id = parse_id(&book_id, Entity::Book)?;
    let chapter_id = parse_id(&chapter_id, Entity::Chapter)?;
    let paragraph_id = parse_id(&paragraph_id, Entity::Paragraph)?;
    let direction: Direction = direction.parse()?;

    let library = state.library.clone();
    let (chapter, _) = blocking(move || {
        library
            .edit_chapter(book_id, chapter_id, |chapter, _| {
                if chapter.paragraph(paragraph_id).is_none() {
                    return Err(Error::NotFound(Entity::Paragraph));
                }
                match chapter.move_paragraph(paragraph_id, direction) {
                    true => Ok(()),
                    false => Err(Error::Validation(format!(
                        "paragraph cannot move {direction}"
                    ))),
                }
            })?
            .ok_or(Error::NotFound(Entity::Chapter))
    })
    .await?;

    Ok(ok(ParagraphsBody {
        full_text: chapter.full_text(),
        paragraphs: chapter.paragraphs().to_vec(),
    }))
}

// ---------------------------------------------------------------------
// Audio
// ---------------------------------------------------------------------

pub(crate) async fn upload_audio(
    State(state): State<AppState>,
    Path((book_id, chapter_id, paragraph_id)): Path<(String, String, String)>,
    mut multipart: Multipart,
) -> ApiResult<Json<Success<UploadBody>>> {
    let book_id = parse_id(&book_id, Entity::Book)?;
    let chapter_id = parse_id(&chapter_id, Entity::Chapter)?;
    let paragraph_id = parse_id(&paragraph_id, Entity::Paragraph)?;

    let mut audio: Option<Bytes> = None;
    let mut start_time: Option<String> = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("audio") => audio = Some(field.bytes().await?),
            Some("start_time") => start_time = Some(field.text().await?),
            _ => {}
        }
    }
    let audio = audio
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| AppError::bad_request("no audio file in request"))?;

    let library = state.library.clone();
    let (_, (paragraph, path)) = blocking(move || {
        library
            .edit_chapter(book_id, chapter_id, |chapter, assets| {
                let filename = audio_filename(paragraph_id, timestamp::now());
                let paragraph = chapter
                    .add_audio(paragraph_id, filename.as_str(), assets)?
                    .cloned()
                    .ok_or(Error::NotFound(Entity::Paragraph))?;
                let path = assets.write(&filename, &audio)?;
                Ok((paragraph, path))
            })?
            .ok_or(Error::NotFound(Entity::Chapter))
    })
    .await?;

    info!(%paragraph_id, path = %path.display(), "stored recording");
    Ok(ok(UploadBody {
        paragraph,
        audio_path: path.display().to_string(),
        start_time,
    }))
}

pub(crate) async fn get_audio(
    State(state): State<AppState>,
    Path((book_id, chapter_id, filename)): Path<(String, String, String)>,
) -> ApiResult<Response> {
    let book_id = parse_id(&book_id, Entity::Book)?;
    let chapter_id = parse_id(&chapter_id, Entity::Chapter)?;
    let path = state
        .library
        .audio_assets(book_id, chapter_id)
        .path(&filename)?;

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::NotFound(Entity::Audio).into());
        }
        Err(err) => return Err(Error::from(err).into()),
    };

    let body = Body::from_stream(ReaderStream::new(file));
    Ok(([(header::CONTENT_TYPE, content_type_for(&filename))], body).into_response())
}

pub(crate) async fn delete_audio(
    State(state): State<AppState>,
    Path((book_id, chapter_id, paragraph_id)): Path<(String, String, String)>,
) -> ApiResult<Json<Success<ParagraphBody>>> {
    let book_id = parse_id(&book_id, Entity::Book)?;
    let chapter_id = parse_id(&chapter_id, Entity::Chapter)?;
    let paragraph_id = parse_id(&paragraph_id, Entity::Paragraph)?;

    let library = state.library.clone();
    let (_, paragraph) = blocking(move || {
        library
            .edit_chapter(book_id, chapter_id, |chapter, assets| {
                chapter
                    .remove_audio(paragraph_id, assets)?
                    .cloned()
                    .ok_or(Error::NotFound(Entity::Paragraph))
            })?
            .ok_or(Error::NotFound(Entity::Chapter))
    })
    .await?;

    Ok(ok(ParagraphBody {
        paragraph,
        full_text: None,
    }))
}

// ---------------------------------------------------------------------
// Recognition
// ---------------------------------------------------------------------

pub(crate) async fn recognize_audio(
    State(state): State<AppState>,
    payload: Result<Json<RecognizeRequest>, JsonRejection>,
) -> ApiResult<Json<Success<RecognizeBody>>> {
    let Json(req) = payload?;
    let audio_path = req
        .audio_path
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| AppError::bad_request("audio_path is required"))?;
    let started_at_ms = parse_start_time(req.start_time.as_ref());

    let library = state.library.clone();
    let recognizer = state.recognizer.clone();
    let started = Instant::now();
    let res = blocking(move || {
        Transcriber::new(&library, &*recognizer).transcribe_path(&audio_path, started_at_ms)
    })
    .await;

    let outcome = match &res {
        Ok(_) => "ok",
        Err(err) if err.status == axum::http::StatusCode::GATEWAY_TIMEOUT => "timeout",
        Err(_) => "failed",
    };
    metrics::record_recognition(outcome, started.elapsed());

    let transcription = res?;
    Ok(ok(RecognizeBody {
        text: transcription.text,
        transcribe_delay: transcription.transcribe_delay,
    }))
}

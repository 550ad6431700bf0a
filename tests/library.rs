use std::fs;

use voicebook::assets::audio_filename;
use voicebook::paragraph::END_PARAGRAPH_ID;
use voicebook::{Direction, Library, Paragraph, timestamp};

#[test]
fn narrate_a_chapter_end_to_end() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let library = Library::open(dir.path().join("books"))?;

    let mut book = library.create_book("The Novel", "A. Writer")?;
    let entry = library.add_chapter(&mut book, "Chapter 1")?;

    let (_, world) = library
        .edit_chapter(book.id, entry.id, |chapter, _| {
            Ok(chapter.add_paragraph("World", None).id)
        })?
        .expect("chapter exists");
    library.edit_chapter(book.id, entry.id, |chapter, _| {
        let hello = chapter.add_paragraph("Hello", None).id;
        assert!(chapter.move_paragraph(hello, Direction::Up));
        Ok(())
    })?;

    let chapter = library
        .load_chapter(book.id, entry.id)?
        .expect("chapter exists");
    assert_eq!(chapter.full_text(), "Hello\nWorld");
    assert_eq!(chapter.paragraphs().len(), 3);
    assert!(matches!(chapter.paragraphs().last(), Some(Paragraph::End(_))));
    assert_eq!(chapter.paragraph(world).map(|p| p.text.as_str()), Some("World"));

    // Books listed from disk carry the chapter entry.
    let books = library.list_books()?;
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].chapters[0].title, "Chapter 1");
    Ok(())
}

#[test]
fn replacing_audio_removes_the_previous_artifact_set() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let library = Library::open(dir.path())?;
    let mut book = library.create_book("B", "")?;
    let entry = library.add_chapter(&mut book, "C")?;
    let assets = library.audio_assets(book.id, entry.id);

    let (_, id) = library
        .edit_chapter(book.id, entry.id, |chapter, assets| {
            let id = chapter.add_paragraph("", None).id;
            chapter.add_audio(id, "a.wav", assets)?;
            Ok(id)
        })?
        .expect("chapter exists");
    for name in ["a.wav", "a.txt", "a.merge.txt", "a.srt", "a.json", "other.wav"] {
        fs::write(assets.dir().join(name), b"x")?;
    }

    library.edit_chapter(book.id, entry.id, |chapter, assets| {
        chapter.add_audio(id, "b.wav", assets)?;
        Ok(())
    })?;

    let mut left: Vec<String> = fs::read_dir(assets.dir())?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    left.sort();
    assert_eq!(left, vec!["other.wav".to_owned()]);

    let chapter = library
        .load_chapter(book.id, entry.id)?
        .expect("chapter exists");
    assert_eq!(chapter.paragraph(id).and_then(|p| p.audio.as_deref()), Some("b.wav"));
    Ok(())
}

#[test]
fn deleting_a_paragraph_deletes_its_recording() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let library = Library::open(dir.path())?;
    let mut book = library.create_book("B", "")?;
    let entry = library.add_chapter(&mut book, "C")?;

    let (_, (id, path)) = library
        .edit_chapter(book.id, entry.id, |chapter, assets| {
            let id = chapter.add_paragraph("take one", None).id;
            let filename = audio_filename(id, timestamp::now());
            chapter.add_audio(id, filename.as_str(), assets)?;
            let path = assets.write(&filename, b"RIFF")?;
            Ok((id, path))
        })?
        .expect("chapter exists");
    assert!(path.is_file());

    let (chapter, deleted) = library
        .edit_chapter(book.id, entry.id, |chapter, assets| {
            chapter.delete_paragraph(id, assets)
        })?
        .expect("chapter exists");
    assert!(deleted);
    assert!(!path.exists());
    assert_eq!(chapter.full_text(), "");
    Ok(())
}

#[test]
fn documents_on_disk_keep_the_legacy_shape() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let library = Library::open(dir.path())?;
    let mut book = library.create_book("B", "")?;
    let entry = library.add_chapter(&mut book, "C")?;
    library.edit_chapter(book.id, entry.id, |chapter, _| {
        chapter.add_paragraph("only", None);
        Ok(())
    })?;

    let raw = fs::read_to_string(
        library
            .chapter_dir(book.id, entry.id)
            .join(voicebook::library::CHAPTER_CONTENT_FILE),
    )?;
    let doc: serde_json::Value = serde_json::from_str(&raw)?;
    let paragraphs = doc["paragraphs"].as_array().cloned().unwrap_or_default();
    assert_eq!(paragraphs.len(), 2);
    assert_eq!(paragraphs[0]["text"], "only");
    assert_eq!(paragraphs[0]["audio"], "");
    assert_eq!(paragraphs[1]["id"], END_PARAGRAPH_ID);
    assert_eq!(paragraphs[1]["is_end_paragraph"], true);

    let info: serde_json::Value = serde_json::from_str(&fs::read_to_string(
        library
            .book_dir(book.id)
            .join(voicebook::library::BOOK_INFO_FILE),
    )?)?;
    assert_eq!(info["chapters"][0]["id"], entry.id.to_string());
    Ok(())
}

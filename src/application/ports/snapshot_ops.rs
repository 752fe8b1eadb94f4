//! 基于基本 CRUD 的通用实现：级联删除、快照收集与应用
//!
//! 并非所有引擎都提供外键或批量导出，这里统一按书籍逐条处理。

use crate::domain::{BookEntry, Snapshot};

use super::{StorageBackend, StorageError};

/// 先删除书籍下的章节和片段，再删除书籍本身
pub async fn cascade_delete_book<B>(backend: &B, book_id: &str) -> Result<(), StorageError>
where
    B: StorageBackend + ?Sized,
{
    let chapters = backend.list_chapters(book_id).await?;
    for chapter in &chapters {
        backend.delete_chapter(book_id, &chapter.id).await?;
    }

    let fragments = backend.list_fragments(book_id).await?;
    for fragment in &fragments {
        backend.delete_fragment(book_id, &fragment.id).await?;
    }

    backend.remove_book_record(book_id).await?;

    tracing::debug!(
        backend = backend.kind().as_str(),
        book_id = %book_id,
        chapters = chapters.len(),
        fragments = fragments.len(),
        "Book deleted with dependents"
    );

    Ok(())
}

/// 收集全部书籍（附带章节与片段）和 AI 配置
pub async fn collect_snapshot<B>(backend: &B) -> Result<Snapshot, StorageError>
where
    B: StorageBackend + ?Sized,
{
    let mut snapshot = Snapshot::default();

    for book in backend.list_books().await? {
        let book_id = book.id.clone();
        let mut entry = BookEntry::new(book);
        entry.chapters = backend.list_chapters(&book_id).await?;
        entry.fragments = backend.list_fragments(&book_id).await?;
        snapshot.books.insert(book_id, entry);
    }

    for provider in backend.list_ai_configs().await? {
        if let Some(config) = backend.get_ai_config(&provider).await? {
            snapshot.ai_configs.insert(provider, config);
        }
    }

    let counts = snapshot.counts();
    tracing::info!(
        backend = backend.kind().as_str(),
        books = counts.books,
        chapters = counts.chapters,
        fragments = counts.fragments,
        ai_configs = counts.ai_configs,
        "Data exported"
    );

    Ok(snapshot)
}

/// 逐条 upsert 快照中的记录
///
/// 书籍以快照中的键为准；章节和片段归属于所在条目的书籍。
/// 中途失败时已写入的记录不会回滚。
pub async fn apply_snapshot<B>(backend: &B, snapshot: &Snapshot) -> Result<(), StorageError>
where
    B: StorageBackend + ?Sized,
{
    for (book_id, entry) in &snapshot.books {
        let mut book = entry.book.clone();
        book.id = book_id.clone();
        backend.save_book(&book).await?;

        for chapter in &entry.chapters {
            backend.save_chapter(book_id, chapter).await?;
        }
        for fragment in &entry.fragments {
            backend.save_fragment(book_id, fragment).await?;
        }
    }

    for (provider, config) in &snapshot.ai_configs {
        backend.save_ai_config(provider, config).await?;
    }

    let counts = snapshot.counts();
    tracing::info!(
        backend = backend.kind().as_str(),
        books = counts.books,
        chapters = counts.chapters,
        fragments = counts.fragments,
        ai_configs = counts.ai_configs,
        "Data imported"
    );

    Ok(())
}

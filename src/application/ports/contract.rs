//! 存储后端一致性测试
//!
//! 每个后端实现都应通过这里的检查；各后端的测试模块负责构造实例并调用。

use crate::domain::{AiProviderConfig, Book, Chapter, ChapterKind, Fragment};

use super::StorageBackend;

/// 依次运行全部检查（每项检查前清空数据）
pub async fn run_all(backend: &dyn StorageBackend) {
    backend.connect().await.unwrap();
    // 重复连接不应失败
    backend.connect().await.unwrap();

    missing_records_return_none(backend).await;
    book_upsert_is_idempotent(backend).await;
    chapter_lifecycle(backend).await;
    cascade_delete_removes_dependents(backend).await;
    chapters_are_listed_by_order_index(backend).await;
    listings_stay_within_their_book(backend).await;
    ai_config_crud(backend).await;
    provider_names_are_case_sensitive(backend).await;
    export_import_round_trip(backend).await;
    clear_all_data_empties_every_kind(backend).await;

    assert!(backend.test_connection().await.success);
    backend.clear_all_data().await.unwrap();
    backend.disconnect().await.unwrap();
    backend.disconnect().await.unwrap();
}

/// 把 `source` 的数据导入 `target` 后逐条比较
pub async fn check_portability(source: &dyn StorageBackend, target: &dyn StorageBackend) {
    source.clear_all_data().await.unwrap();
    target.clear_all_data().await.unwrap();

    let book = seed_book(source, "Portable", 3, 2).await;
    source
        .save_ai_config("deepseek", &AiProviderConfig::new("deepseek-chat", "sk-1"))
        .await
        .unwrap();

    let snapshot = source.export_data().await.unwrap();
    target.import_data(&snapshot).await.unwrap();

    assert_eq!(target.list_books().await.unwrap(), source.list_books().await.unwrap());
    assert_eq!(
        target.list_chapters(&book.id).await.unwrap(),
        source.list_chapters(&book.id).await.unwrap()
    );
    assert_eq!(
        target.list_fragments(&book.id).await.unwrap(),
        source.list_fragments(&book.id).await.unwrap()
    );
    assert_eq!(
        target.list_ai_configs().await.unwrap(),
        vec!["deepseek".to_string()]
    );
    assert_eq!(
        target.get_ai_config("deepseek").await.unwrap(),
        source.get_ai_config("deepseek").await.unwrap()
    );
}

/// 保存一本带 `chapters` 个章节和 `fragments` 个片段的书
pub async fn seed_book(
    backend: &dyn StorageBackend,
    title: &str,
    chapters: usize,
    fragments: usize,
) -> Book {
    let mut book = Book::new(title);
    book.author = "佚名".to_string();
    book.setting = "架空王朝".to_string();

    for i in 0..chapters {
        let mut chapter = Chapter::new(&book.id, format!("第{}章", i + 1), ChapterKind::Chapter);
        chapter.order_index = i as i64;
        chapter.content = "夜色渐深。".repeat(i + 1);
        book.chapter_ids.push(chapter.id.clone());
        backend.save_chapter(&book.id, &chapter).await.unwrap();
    }
    for i in 0..fragments {
        let fragment = Fragment::new(&book.id, format!("片段{}", i + 1), "灵感");
        backend.save_fragment(&book.id, &fragment).await.unwrap();
    }

    backend.save_book(&book).await.unwrap();
    book
}

async fn missing_records_return_none(backend: &dyn StorageBackend) {
    backend.clear_all_data().await.unwrap();

    assert!(backend.get_book("nonexistent").await.unwrap().is_none());
    assert!(backend.get_chapter("b1", "nonexistent").await.unwrap().is_none());
    assert!(backend.get_fragment("b1", "nonexistent").await.unwrap().is_none());
    assert!(backend.get_ai_config("nonexistent").await.unwrap().is_none());
    assert!(backend.list_books().await.unwrap().is_empty());
    assert!(backend.list_chapters("b1").await.unwrap().is_empty());
    assert!(backend.list_fragments("b1").await.unwrap().is_empty());
    assert!(backend.list_ai_configs().await.unwrap().is_empty());
}

async fn book_upsert_is_idempotent(backend: &dyn StorageBackend) {
    backend.clear_all_data().await.unwrap();

    let mut book = Book::new("初稿");
    backend.save_book(&book).await.unwrap();
    book.title = "定稿".to_string();
    book.word_count = 1200;
    backend.save_book(&book).await.unwrap();

    let books = backend.list_books().await.unwrap();
    assert_eq!(books.len(), 1);
    assert_eq!(books[0], book);
}

async fn chapter_lifecycle(backend: &dyn StorageBackend) {
    backend.clear_all_data().await.unwrap();

    let mut book = Book::new("T");
    book.id = "b1".to_string();
    backend.save_book(&book).await.unwrap();
    assert_eq!(backend.get_book("b1").await.unwrap().unwrap().title, "T");

    let mut chapter = Chapter::new("b1", "C1", ChapterKind::Chapter);
    chapter.id = "c1".to_string();
    backend.save_chapter("b1", &chapter).await.unwrap();

    let chapters = backend.list_chapters("b1").await.unwrap();
    assert_eq!(chapters.len(), 1);
    assert_eq!(chapters[0].id, "c1");
    assert_eq!(backend.get_chapter("b1", "c1").await.unwrap(), Some(chapter));

    backend.delete_book("b1").await.unwrap();
    assert!(backend.get_book("b1").await.unwrap().is_none());
    assert!(backend.list_chapters("b1").await.unwrap().is_empty());
}

async fn cascade_delete_removes_dependents(backend: &dyn StorageBackend) {
    backend.clear_all_data().await.unwrap();

    let doomed = seed_book(backend, "Doomed", 4, 3).await;
    let kept = seed_book(backend, "Kept", 1, 1).await;

    backend.delete_book(&doomed.id).await.unwrap();

    assert!(backend.list_chapters(&doomed.id).await.unwrap().is_empty());
    assert!(backend.list_fragments(&doomed.id).await.unwrap().is_empty());
    assert_eq!(backend.list_chapters(&kept.id).await.unwrap().len(), 1);
    assert_eq!(backend.list_fragments(&kept.id).await.unwrap().len(), 1);

    // 单独删除章节和片段
    let chapter_id = kept.chapter_ids[0].clone();
    backend.delete_chapter(&kept.id, &chapter_id).await.unwrap();
    assert!(backend.get_chapter(&kept.id, &chapter_id).await.unwrap().is_none());
    let fragment = backend.list_fragments(&kept.id).await.unwrap().remove(0);
    backend.delete_fragment(&kept.id, &fragment.id).await.unwrap();
    assert!(backend.get_fragment(&kept.id, &fragment.id).await.unwrap().is_none());
}

async fn chapters_are_listed_by_order_index(backend: &dyn StorageBackend) {
    backend.clear_all_data().await.unwrap();

    let book = Book::new("Ordered");
    backend.save_book(&book).await.unwrap();
    for (order, title) in [(2, "三"), (0, "一"), (1, "二")] {
        let mut chapter = Chapter::new(&book.id, title, ChapterKind::Chapter);
        chapter.order_index = order;
        backend.save_chapter(&book.id, &chapter).await.unwrap();
    }

    let titles: Vec<String> = backend
        .list_chapters(&book.id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.title)
        .collect();
    assert_eq!(titles, vec!["一", "二", "三"]);
}

async fn listings_stay_within_their_book(backend: &dyn StorageBackend) {
    backend.clear_all_data().await.unwrap();

    let mut book = Book::new("A");
    book.id = "a".to_string();
    let mut nested = Book::new("A:B");
    nested.id = "a:b".to_string();
    backend.save_book(&book).await.unwrap();
    backend.save_book(&nested).await.unwrap();

    let mut chapter = Chapter::new("a:b", "C", ChapterKind::Chapter);
    chapter.id = "c".to_string();
    backend.save_chapter("a:b", &chapter).await.unwrap();
    let fragment = Fragment::new("a:b", "F", "灵感");
    backend.save_fragment("a:b", &fragment).await.unwrap();

    assert!(backend.list_chapters("a").await.unwrap().is_empty());
    assert!(backend.list_fragments("a").await.unwrap().is_empty());
    assert_eq!(backend.list_chapters("a:b").await.unwrap(), vec![chapter]);
    assert_eq!(backend.list_fragments("a:b").await.unwrap(), vec![fragment]);

    let snapshot = backend.export_data().await.unwrap();
    assert!(snapshot.books["a"].chapters.is_empty());
    assert_eq!(snapshot.books["a:b"].chapters.len(), 1);
}

async fn ai_config_crud(backend: &dyn StorageBackend) {
    backend.clear_all_data().await.unwrap();

    let mut config = AiProviderConfig::new("gpt-4o", "sk-old");
    backend.save_ai_config("openai", &config).await.unwrap();
    config.api_key = "sk-new".to_string();
    config.temperature = 0.2;
    backend.save_ai_config("openai", &config).await.unwrap();
    backend
        .save_ai_config("claude", &AiProviderConfig::new("claude-sonnet", "sk-c"))
        .await
        .unwrap();

    let mut providers = backend.list_ai_configs().await.unwrap();
    providers.sort();
    assert_eq!(providers, vec!["claude".to_string(), "openai".to_string()]);
    assert_eq!(backend.get_ai_config("openai").await.unwrap(), Some(config));

    backend.delete_ai_config("openai").await.unwrap();
    assert!(backend.get_ai_config("openai").await.unwrap().is_none());
}

async fn provider_names_are_case_sensitive(backend: &dyn StorageBackend) {
    backend.clear_all_data().await.unwrap();

    backend
        .save_ai_config("OpenAI", &AiProviderConfig::new("gpt-4o", "sk-upper"))
        .await
        .unwrap();
    backend
        .save_ai_config("openai", &AiProviderConfig::new("gpt-4o-mini", "sk-lower"))
        .await
        .unwrap();

    let mut providers = backend.list_ai_configs().await.unwrap();
    providers.sort();
    assert_eq!(providers, vec!["OpenAI".to_string(), "openai".to_string()]);
    assert_eq!(
        backend.get_ai_config("OpenAI").await.unwrap().unwrap().api_key,
        "sk-upper"
    );
}

async fn export_import_round_trip(backend: &dyn StorageBackend) {
    backend.clear_all_data().await.unwrap();

    let book = seed_book(backend, "Round Trip", 2, 2).await;
    backend
        .save_ai_config("openai", &AiProviderConfig::new("gpt-4o", "sk"))
        .await
        .unwrap();

    let snapshot = backend.export_data().await.unwrap();
    let counts = snapshot.counts();
    assert_eq!(counts.books, 1);
    assert_eq!(counts.chapters, 2);
    assert_eq!(counts.fragments, 2);
    assert_eq!(counts.ai_configs, 1);

    backend.clear_all_data().await.unwrap();
    backend.import_data(&snapshot).await.unwrap();

    assert_eq!(backend.list_books().await.unwrap(), vec![book.clone()]);
    assert_eq!(backend.export_data().await.unwrap(), snapshot);
}

async fn clear_all_data_empties_every_kind(backend: &dyn StorageBackend) {
    seed_book(backend, "Temp", 1, 1).await;
    backend
        .save_ai_config("openai", &AiProviderConfig::default())
        .await
        .unwrap();

    backend.clear_all_data().await.unwrap();

    let snapshot = backend.export_data().await.unwrap();
    assert!(snapshot.is_empty());
}

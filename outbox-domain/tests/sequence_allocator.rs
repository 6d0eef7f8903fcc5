use anyhow::Result as AnyResult;
use async_trait::async_trait;
use outbox_domain::error::{DomainError, DomainResult};
use outbox_domain::persist::{InMemoryDatabase, SeqRecord, SeqStore};
use outbox_domain::seq::{SeqConfig, SequenceAllocator};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// 统计落盘次数的 SeqStore 包装
#[derive(Clone, Default)]
struct CountingStore {
    inner: InMemoryDatabase,
    saves: Arc<AtomicUsize>,
    fail_saves: Arc<AtomicBool>,
}
#[async_trait]
impl SeqStore for CountingStore {
    async fn query_seq(&self, key: &str) -> DomainResult<Option<SeqRecord>> {
        self.inner.query_seq(key).await
    }
    async fn reserve_seq(&self, key: &str, step: i64, base: i64) -> DomainResult<i64> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(DomainError::database("connection reset"));
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.reserve_seq(key, step, base).await
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_callers_get_unique_increasing_numbers() -> AnyResult<()> {
    let store = CountingStore::default();
    let alloc = Arc::new(SequenceAllocator::new(
        Arc::new(store.clone()),
        SeqConfig { base: 0, step: 7 },
    ));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let alloc = alloc.clone();
        tasks.push(tokio::spawn(async move {
            let mut seen = Vec::new();
            for _ in 0..50 {
                seen.push(alloc.gen_seq("groupMember").await.unwrap());
            }
            seen
        }));
    }

    let mut all = HashSet::new();
    for t in tasks {
        let seen = t.await?;
        // 单个调用方看到的序号严格递增
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        all.extend(seen);
    }
    assert_eq!(all.len(), 400);
    assert_eq!(all.iter().min(), Some(&1));
    assert_eq!(all.iter().max(), Some(&400));

    // 已发放的最大号不超过持久化上界
    let rec = store.query_seq("seq:groupMember").await?.unwrap();
    assert!(rec.min_seq >= 400);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn restart_never_reissues_numbers() -> AnyResult<()> {
    let db = InMemoryDatabase::new();
    let config = SeqConfig { base: 0, step: 1000 };

    let first = SequenceAllocator::new(Arc::new(db.clone()), config);
    let mut last = 0;
    for _ in 0..10 {
        last = first.gen_seq("user").await?;
    }
    assert_eq!(last, 10);
    drop(first);

    // 进程重启：新实例从持久化上界之后开始
    let second = SequenceAllocator::new(Arc::new(db.clone()), config);
    let next = second.gen_seq("user").await?;
    assert!(next > last);
    assert_eq!(next, 1001);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn small_step_extends_exactly_once() -> AnyResult<()> {
    let store = CountingStore::default();
    let alloc = SequenceAllocator::new(Arc::new(store.clone()), SeqConfig { base: 0, step: 3 });

    let mut issued = Vec::new();
    for _ in 0..3 {
        issued.push(alloc.gen_seq("setting").await?);
    }
    // 首次使用预留一次
    assert_eq!(store.saves.load(Ordering::SeqCst), 1);

    issued.push(alloc.gen_seq("setting").await?);
    assert_eq!(issued, vec![1, 2, 3, 4]);
    assert_eq!(store.saves.load(Ordering::SeqCst), 2);

    let rec = store.query_seq("seq:setting").await?.unwrap();
    assert_eq!(rec.min_seq, 6);
    assert_eq!(rec.step, 3);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn reservation_failure_is_returned_to_caller() -> AnyResult<()> {
    let store = CountingStore::default();
    let alloc = SequenceAllocator::new(Arc::new(store.clone()), SeqConfig { base: 0, step: 2 });

    assert_eq!(alloc.gen_seq("group").await?, 1);
    assert_eq!(alloc.gen_seq("group").await?, 2);

    store.fail_saves.store(true, Ordering::SeqCst);
    let err = alloc.gen_seq("group").await.unwrap_err();
    assert!(matches!(err, DomainError::Sequence { ref flag, .. } if flag == "group"));

    // 预留失败没有发出任何号，存储恢复后从新号段继续
    store.fail_saves.store(false, Ordering::SeqCst);
    assert_eq!(alloc.gen_seq("group").await?, 3);
    let rec = store.query_seq("seq:group").await?.unwrap();
    assert_eq!(rec.min_seq, 4);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn allocators_sharing_a_database_take_disjoint_segments() -> AnyResult<()> {
    let db = InMemoryDatabase::new();
    let config = SeqConfig { base: 0, step: 3 };
    let a = SequenceAllocator::new(Arc::new(db.clone()), config);
    let b = SequenceAllocator::new(Arc::new(db.clone()), config);

    let mut issued = vec![a.gen_seq("group").await?, b.gen_seq("group").await?];
    for _ in 0..3 {
        issued.push(a.gen_seq("group").await?);
    }
    // a: (0,3] 然后 (6,9]；b: (3,6]
    assert_eq!(issued, vec![1, 4, 2, 3, 7]);

    let unique: HashSet<i64> = issued.iter().copied().collect();
    assert_eq!(unique.len(), issued.len());
    assert_eq!(db.query_seq("seq:group").await?.unwrap().min_seq, 9);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_allocators_never_collide() -> AnyResult<()> {
    let db = InMemoryDatabase::new();
    let config = SeqConfig { base: 0, step: 5 };

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let alloc = Arc::new(SequenceAllocator::new(Arc::new(db.clone()), config));
        for _ in 0..2 {
            let alloc = alloc.clone();
            tasks.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                for _ in 0..40 {
                    seen.push(alloc.gen_seq("user").await.unwrap());
                }
                seen
            }));
        }
    }

    let mut all = HashSet::new();
    let mut total = 0;
    for t in tasks {
        let seen = t.await?;
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        total += seen.len();
        all.extend(seen);
    }
    assert_eq!(total, 320);
    assert_eq!(all.len(), 320);
    Ok(())
}

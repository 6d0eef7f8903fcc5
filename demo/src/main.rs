use async_trait::async_trait;
use outbox_application::notify::{
    CHANNEL_TYPE_PERSON, CmdRequest, GroupCreateNotifier, GroupCreatePayload, UserBase, send_cmd,
};
use outbox_application::{AppContext, EventModule, LogSink, NotificationSink, OutboxConfig};
use outbox_domain::event::{EventKind, EventStatus, EventType, NewEventRecord};
use outbox_domain::eventing::{EventCommitter, EventListener};
use outbox_domain::persist::{InMemoryDatabase, OutboxStore};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

struct GroupModule {
    sink: Arc<dyn NotificationSink>,
}

impl EventModule for GroupModule {
    fn name(&self) -> &str {
        "group"
    }

    fn install(&self, ctx: &AppContext) {
        ctx.register_handler(
            EventKind::GroupCreate,
            Arc::new(GroupCreateNotifier::new(self.sink.clone())),
        );
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FriendApply {
    from_uid: String,
    to_uid: String,
    remark: String,
}

/// 好友申请：通知被申请人刷新好友请求列表
struct FriendApplyListener {
    sink: Arc<dyn NotificationSink>,
}

#[async_trait]
impl EventListener for FriendApplyListener {
    async fn on_event(&self, data: &str, committer: EventCommitter) {
        let outcome: anyhow::Result<()> = async {
            let apply: FriendApply = serde_json::from_str(data)?;
            let cmd = CmdRequest {
                channel_id: apply.to_uid.clone(),
                channel_type: CHANNEL_TYPE_PERSON,
                cmd: "friendRequest".into(),
                param: Some(json!({ "apply_uid": apply.from_uid, "remark": apply.remark })),
                ..Default::default()
            };
            send_cmd(self.sink.as_ref(), &cmd).await
        }
        .await;

        if let Err(err) = committer.commit(outcome).await {
            tracing::error!(error = %err, "commit friend.apply failed");
        }
    }
}

struct FriendModule {
    sink: Arc<dyn NotificationSink>,
}

impl EventModule for FriendModule {
    fn name(&self) -> &str {
        "friend"
    }

    fn install(&self, ctx: &AppContext) {
        ctx.register_listener(
            EventKind::FriendApply,
            Arc::new(FriendApplyListener {
                sink: self.sink.clone(),
            }),
        );
    }
}

async fn create_group(
    ctx: &AppContext,
    db: &InMemoryDatabase,
    group_no: &str,
    dispatch: bool,
) -> anyhow::Result<i64> {
    let version = ctx.gen_seq("group").await?;
    let member_version = ctx.gen_seq("groupMember").await?;
    let payload = GroupCreatePayload {
        creator: "u1".into(),
        creator_name: "alice".into(),
        group_no: group_no.into(),
        version,
        members: ["alice", "bob", "carol"]
            .iter()
            .enumerate()
            .map(|(i, name)| UserBase {
                uid: format!("u{}", i + 1),
                name: name.to_string(),
            })
            .collect(),
    };

    let mut tx = db.begin();
    tx.insert_row("group", group_no, json!({ "group_no": group_no, "version": version }));
    tx.insert_row(
        "group_member",
        &format!("{group_no}:u1"),
        json!({ "role": "creator", "version": member_version }),
    );
    let record = NewEventRecord::for_kind(EventKind::GroupCreate, EventType::Message, &payload)?;
    let id = match ctx.event_begin(record, &mut tx).await {
        Ok(id) => id,
        Err(err) => {
            tx.rollback();
            return Err(err.into());
        }
    };
    tx.commit().await?;

    if dispatch {
        ctx.event_commit(id).await;
    }
    Ok(id)
}

async fn wait_final(db: &InMemoryDatabase, id: i64) -> anyhow::Result<EventStatus> {
    let status = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match db.query_by_id(id).await {
                Ok(Some(record)) if record.status.is_terminal() => return record.status,
                _ => tokio::time::sleep(Duration::from_millis(20)).await,
            }
        }
    })
    .await?;
    Ok(status)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let db = InMemoryDatabase::new();
    let mut config = OutboxConfig::from_env()?;
    config.sweeper.grace = Duration::ZERO;
    let ctx = AppContext::new(config, Arc::new(db.clone()));

    let sink = Arc::new(LogSink::new());
    ctx.install(&GroupModule { sink: sink.clone() });
    ctx.install(&FriendModule { sink: sink.clone() });

    // 1) 正常路径：提交后立即分发
    let id = create_group(&ctx, &db, "g-1001", true).await?;
    println!("group.create #{id} -> {:?}", wait_final(&db, id).await?);

    // 2) 监听者路径
    let mut tx = db.begin();
    let apply = FriendApply {
        from_uid: "u2".into(),
        to_uid: "u3".into(),
        remark: "hi".into(),
    };
    let id = ctx
        .event_begin(
            NewEventRecord::for_kind(EventKind::FriendApply, EventType::Cmd, &apply)?,
            &mut tx,
        )
        .await?;
    tx.commit().await?;
    ctx.event_commit(id).await;
    println!("friend.apply #{id} -> {:?}", wait_final(&db, id).await?);

    // 3) 提交后“崩溃”：未分发的事件由补偿扫描重投
    let id = create_group(&ctx, &db, "g-1002", false).await?;
    let report = ctx.sweep_once().await?;
    println!(
        "sweep fetched={} dispatched={}, group.create #{id} -> {:?}",
        report.fetched,
        report.dispatched,
        wait_final(&db, id).await?
    );

    ctx.shutdown().await;
    println!("notifications sent: {}", sink.sent().len());
    println!("pool: {:?}", ctx.pool_stats());
    Ok(())
}

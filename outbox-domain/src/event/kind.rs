//! 已知事件目录（EventKind）
//!
//! 编译期可知的事件集合以封闭枚举表达，处理器按枚举注册；
//! 目录之外的事件名只能通过监听者（listener）这一动态扩展点消费。
//!
use crate::error::DomainError;
use std::fmt;
use std::str::FromStr;

macro_rules! event_kinds {
    ($($(#[$meta:meta])* $variant:ident => $name:literal,)+) => {
        #[non_exhaustive]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum EventKind {
            $($(#[$meta])* $variant,)+
        }

        impl EventKind {
            pub const ALL: &'static [EventKind] = &[$(EventKind::$variant,)+];

            /// 持久化在 `event.event` 列中的事件名
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(EventKind::$variant => $name,)+
                }
            }
        }

        impl FromStr for EventKind {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(EventKind::$variant),)+
                    other => Err(DomainError::Parse {
                        reason: format!("unknown event: {other}"),
                    }),
                }
            }
        }
    };
}

event_kinds! {
    /// 群创建
    GroupCreate => "group.create",
    /// 无法添加注销账号到群聊
    GroupUnableAddDestroyAccount => "group.unable.add.destroy.account",
    /// 群更新
    GroupUpdate => "group.update",
    /// 群成员添加
    GroupMemberAdd => "group.memberadd",
    /// 扫码加入群
    GroupMemberScanJoin => "group.member.scan.join",
    /// 转让群主
    GroupMemberTransferGrouper => "group.member.transfer.grouper",
    /// 群头像更新
    GroupAvatarUpdate => "group.avatar.update",
    /// 群成员移除
    GroupMemberRemove => "group.memberremove",
    /// 群邀请请求
    GroupMemberInviteRequest => "group.member.invite",
    /// 好友申请
    FriendApply => "friend.apply",
    /// 好友确认
    FriendSure => "friend.sure",
    /// 好友删除
    FriendDelete => "friend.delete",
    /// 删除最近会话
    ConversationDelete => "conversation.delete",
    Transfer => "transfer",
    RedpacketReceive => "redpacket.receive",
    UserRegister => "user.register",
    MomentPublish => "moment.publish",
    MomentDelete => "moment.delete",
    OrgOrDeptCreate => "organization_department.create",
    OrgOrDeptEmployeeUpdate => "organization_department.employee.update",
    OrgEmployeeExit => "organization.employee.exit",
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

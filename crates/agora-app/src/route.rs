/// Navigation targets a screen can hand back to its host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Login,
    SignUp,
    Feed,
    Comments { article_id: String },
    Inbox,
    Chat { peer_id: String },
    Publish,
    Profile,
    Search,
    UserDetail { user_id: String },
}

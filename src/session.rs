use crate::User;

/// A bearer token and the user it authorizes.
///
/// The two only ever exist together, so a [`Session`] can never end up
/// holding one without the other.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct Credentials {
    pub token: String,
    pub user: User,
}

impl Credentials {
    /// Pair a token with its user, rejecting empty tokens.
    pub fn new<S: Into<String>>(token: S, user: User) -> Option<Credentials> {
        let token = token.into();

        if token.is_empty() {
            None
        } else {
            Some(Credentials { token, user })
        }
    }
}

/// Whether anyone is logged in, and who.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    credentials: Option<Credentials>,
}

impl Session {
    pub fn empty() -> Session { Session::default() }

    pub fn authenticated(credentials: Credentials) -> Session {
        Session {
            credentials: Some(credentials),
        }
    }

    pub fn is_authenticated(&self) -> bool { self.credentials.is_some() }

    pub fn token(&self) -> Option<&str> {
        self.credentials.as_ref().map(|c| c.token.as_str())
    }

    pub fn current_user(&self) -> Option<&User> {
        self.credentials.as_ref().map(|c| &c.user)
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub(crate) fn set(&mut self, credentials: Credentials) {
        self.credentials = Some(credentials);
    }

    /// Forget the current credentials, returning them if there were any.
    pub(crate) fn clear(&mut self) -> Option<Credentials> {
        self.credentials.take()
    }
}

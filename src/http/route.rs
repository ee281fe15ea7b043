use crate::{
    id::{ChannelId, GuildId, MessageId, RoleId, UserId},
    request::{RequestError, RequestResult},
};
use reqwest::Method;
use std::fmt;

/// A REST endpoint: an HTTP method, and a path template relative to the API
/// base URL.
///
/// Templates name their parameters in braces, e.g.
/// `/channels/{channel.id}/messages/{message.id}`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Route {
    method: Method,
    template: &'static str,
}

impl Route {
    /// `GET /gateway/bot`
    pub const GET_GATEWAY_BOT: Route = Route::new(Method::GET, "/gateway/bot");
    /// `GET /users/@me`
    pub const GET_CURRENT_USER: Route = Route::new(Method::GET, "/users/@me");
    /// `GET /guilds/{guild.id}`
    pub const GET_GUILD: Route = Route::new(Method::GET, "/guilds/{guild.id}");
    /// `GET /channels/{channel.id}`
    pub const GET_CHANNEL: Route = Route::new(Method::GET, "/channels/{channel.id}");
    /// `POST /channels/{channel.id}/messages`
    pub const CREATE_MESSAGE: Route = Route::new(Method::POST, "/channels/{channel.id}/messages");
    /// `PATCH /channels/{channel.id}/messages/{message.id}`
    pub const EDIT_MESSAGE: Route =
        Route::new(Method::PATCH, "/channels/{channel.id}/messages/{message.id}");
    /// `DELETE /channels/{channel.id}/messages/{message.id}`
    pub const DELETE_MESSAGE: Route =
        Route::new(Method::DELETE, "/channels/{channel.id}/messages/{message.id}");
    /// `PUT /guilds/{guild.id}/members/{user.id}/roles/{role.id}`
    pub const ADD_MEMBER_ROLE: Route = Route::new(
        Method::PUT,
        "/guilds/{guild.id}/members/{user.id}/roles/{role.id}",
    );
    /// `DELETE /guilds/{guild.id}/members/{user.id}/roles/{role.id}`
    pub const REMOVE_MEMBER_ROLE: Route = Route::new(
        Method::DELETE,
        "/guilds/{guild.id}/members/{user.id}/roles/{role.id}",
    );

    /// Creates a route for an endpoint not covered by the constants above.
    pub const fn new(method: Method, template: &'static str) -> Self {
        Self { method, template }
    }

    /// HTTP method of this route.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Unsubstituted path template.
    pub fn template(&self) -> &'static str {
        self.template
    }

    /// Substitutes every `{name}` in the template from `params`.
    pub fn compile(&self, params: &RouteParams) -> RequestResult<CompiledRoute> {
        let mut path = String::with_capacity(self.template.len() + 32);
        let mut rest = self.template;

        while let Some(start) = rest.find('{') {
            path.push_str(&rest[..start]);

            let end = rest[start..]
                .find('}')
                .map(|i| start + i)
                .ok_or_else(|| RequestError::MissingRouteParam(rest[start..].to_string()))?;
            let name = &rest[start + 1..end];

            let value = params
                .get(name)
                .ok_or_else(|| RequestError::MissingRouteParam(name.to_string()))?;
            path.push_str(&value.to_string());

            rest = &rest[end + 1..];
        }
        path.push_str(rest);

        Ok(CompiledRoute {
            bucket_key: self.bucket_key(params),
            method: self.method.clone(),
            path,
        })
    }

    /// Rate limits are shared by routes with the same template and top-level
    /// resource, so the bucket key keeps the major parameter only.
    fn bucket_key(&self, params: &RouteParams) -> String {
        let major = ["guild.id", "channel.id"]
            .iter()
            .find(|name| self.template.contains(&format!("{{{}}}", name)))
            .and_then(|name| params.get(name));

        match major {
            Some(id) => format!("{} {} {}", self.method, self.template, id),
            None => format!("{} {}", self.method, self.template),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.template)
    }
}

/// Values substituted into a [`Route`] template.
#[derive(Clone, Debug, Default)]
pub struct RouteParams {
    values: Vec<(&'static str, u64)>,
}

impl RouteParams {
    /// Creates an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `{guild.id}`.
    #[must_use]
    pub fn guild(self, id: GuildId) -> Self {
        self.with("guild.id", id.0)
    }

    /// Sets `{channel.id}`.
    #[must_use]
    pub fn channel(self, id: ChannelId) -> Self {
        self.with("channel.id", id.0)
    }

    /// Sets `{user.id}`.
    #[must_use]
    pub fn user(self, id: UserId) -> Self {
        self.with("user.id", id.0)
    }

    /// Sets `{message.id}`.
    #[must_use]
    pub fn message(self, id: MessageId) -> Self {
        self.with("message.id", id.0)
    }

    /// Sets `{role.id}`.
    #[must_use]
    pub fn role(self, id: RoleId) -> Self {
        self.with("role.id", id.0)
    }

    fn with(mut self, name: &'static str, value: u64) -> Self {
        self.values.retain(|(n, _)| *n != name);
        self.values.push((name, value));
        self
    }

    fn get(&self, name: &str) -> Option<u64> {
        self.values
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
    }
}

/// A [`Route`] with every parameter substituted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CompiledRoute {
    /// HTTP method to send.
    pub method: Method,
    /// Path relative to the API base, beginning with `/`.
    pub path: String,
    /// Key under which this route's rate-limit bucket is tracked.
    pub bucket_key: String,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn compile_substitutes_every_param() {
        let route = Route::DELETE_MESSAGE
            .compile(&RouteParams::new().channel(ChannelId(10)).message(MessageId(20)))
            .unwrap();

        assert_eq!(route.method, Method::DELETE);
        assert_eq!(route.path, "/channels/10/messages/20");
    }

    #[test]
    fn compile_without_params() {
        let route = Route::GET_CURRENT_USER.compile(&RouteParams::new()).unwrap();

        assert_eq!(route.path, "/users/@me");
        assert_eq!(route.bucket_key, "GET /users/@me");
    }

    #[test]
    fn missing_param_is_reported() {
        let err = Route::ADD_MEMBER_ROLE
            .compile(&RouteParams::new().guild(GuildId(1)).user(UserId(2)))
            .unwrap_err();

        assert!(matches!(err, RequestError::MissingRouteParam(name) if name == "role.id"));
    }

    #[test]
    fn bucket_key_keeps_major_param_only() {
        let a = Route::EDIT_MESSAGE
            .compile(&RouteParams::new().channel(ChannelId(5)).message(MessageId(1)))
            .unwrap();
        let b = Route::EDIT_MESSAGE
            .compile(&RouteParams::new().channel(ChannelId(5)).message(MessageId(2)))
            .unwrap();
        let c = Route::EDIT_MESSAGE
            .compile(&RouteParams::new().channel(ChannelId(6)).message(MessageId(1)))
            .unwrap();

        assert_eq!(a.bucket_key, b.bucket_key);
        assert_ne!(a.bucket_key, c.bucket_key);
    }
}

//! OpenAPI document served through Scalar at `/docs`.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Parley API",
        description = "Multi-session conversational agent server: chats, streaming turns, tool execution."
    ),
    paths(
        super::health::health,
        super::chats::chats_list,
        super::chats::chats_create,
        super::chats::chats_get,
        super::chats::chats_delete,
        super::stream::chat_message,
        super::stream::chat_subscribe,
        super::files::chat_upload,
    ),
    components(schemas(
        super::ErrorResponse,
        super::chats::CreateChatRequest,
        super::chats::CreateChatResponse,
        super::chats::DeleteChatResponse,
        super::stream::SendMessageRequest,
        super::files::UploadResponse,
        super::health::HealthResponse,
    )),
    tags(
        (name = "Chats", description = "Chat lifecycle and streaming"),
        (name = "Health", description = "Liveness")
    )
)]
pub struct ApiDoc;

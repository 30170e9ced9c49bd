//! User-facing bot messages

pub const CANCEL_BUTTON: &str = "Отмена🔴";

pub const LICENCE: &str = "Проект находится под лицензией AGPL v3:\n\
https://www.gnu.org/licenses/agpl-3.0.txt";

pub const ACCOUNT_DELETED: &str = "Вы успешно вышли из сервиса. Все данные будут удалены.";

pub const ASK_FOR_SOURCE: &str = "Введите ссылку на источник или нажмите 'Отмена🔴':";

pub const ADD_CANCELLED: &str = "Добавление источника отменено.";

pub const INVALID_LINK: &str = "Некорректная ссылка на источник. Пожалуйста, попробуйте снова.";

pub const CHANNEL_NOT_RESOLVED: &str =
    "Не удалось получить ID канала. Пожалуйста, проверьте ссылку и попробуйте снова.";

pub const NOT_A_CHANNEL: &str =
    "Указанный чат не является каналом. Пожалуйста, отправьте ссылку на публичный канал.";

pub const ALREADY_SUBSCRIBED: &str =
    "Канал уже добавлен в источники. Возможно вы уже добавляли его ранее.";

pub const ADD_FAILED: &str = "Не удалось добавить источник. Пожалуйста, попробуйте позже.";

pub const NOT_REGISTERED: &str = "Вы не зарегистрированы в системе. \
Пожалуйста, добавьте источник, чтобы получить доступ к этой функции.";

pub const NO_SOURCES: &str =
    "У вас нет добавленных источников. Пожалуйста, добавьте хотя бы один источник.";

pub const CHOOSE_CHANNEL_TO_REMOVE: &str = "Выберите канал для удаления:";

pub const TEXT_ONLY: &str = "Пожалуйста, отправьте текстовое сообщение. \
Стикеры, голосовые и другие типы сообщений не поддерживаются.";

pub const OWN_MESSAGE: &str = "Черезвычайно извиняюсь, но я не могу обрабатывать сообщения от себя.";

pub const REQUEST_ACCEPTED: &str = "Сообщение получено! Ожидайте ответа RAG.";

pub const INTERNAL_ERROR: &str = "Произошла ошибка. Пожалуйста, попробуйте позже.";

pub fn welcome(first_name: &str) -> String {
    format!(
        "Добро пожаловать, {}!\n\n\
<u>Доступные команды:</u>\n\n\
/add — для добавления источника,\n\
/remove — для удаления \n\
/get_channels — список ваших источников,\n\
/end — чтобы удалить свой аккаунт.\n\n\
Для получения информации о лицензии используйте /licence.",
        escape_html(first_name)
    )
}

pub fn source_added(link: &str) -> String {
    format!("Источник \"{}\" добавлен!", escape_html(link))
}

pub fn channel_list(channels: &[(i64, String)]) -> String {
    let lines: Vec<String> = channels
        .iter()
        .map(|(id, name)| format!("id: {}, Имя: {}", id, escape_html(name)))
        .collect();
    format!("Ваши источники:\n{}", lines.join("\n"))
}

pub fn channel_removed(channel_id: i64) -> String {
    format!("Канал с ID {} будет удалён.", channel_id)
}

pub fn channel_not_found(channel_id: i64) -> String {
    format!("Канал с ID {} не найден.", channel_id)
}

/// Escape text for HTML parse mode
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

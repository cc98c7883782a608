use crate::config::Config;
use crate::db::Db;
use crate::panel::PanelClient;
use crate::payments::cryptobot::CryptoBotClient;
use crate::payments::platega::PlategaClient;
use std::sync::Arc;
use teloxide::types::Message;

#[derive(Clone)]
pub struct BotState {
    pub config: Arc<Config>,
    pub db: Arc<Db>,
    pub panel: Arc<PanelClient>,
    pub platega: Arc<PlategaClient>,
    pub cryptobot: Arc<CryptoBotClient>,
    pub bot_username: Option<String>,
}

pub fn sender_user_id(msg: &Message) -> Option<i64> {
    msg.from.as_ref().map(|user| user.id.0 as i64)
}

pub fn is_admin_message(msg: &Message, state: &BotState) -> bool {
    sender_user_id(msg).is_some_and(|user_id| state.config.is_admin(user_id))
}

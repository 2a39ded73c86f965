use puzzlehunt_core::{decode_text, encode_text, ExtensionMsg};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;

use crate::bus::{Endpoint, MessageBus, TabId};
use crate::console;
use crate::storage::{StorageArea, StorageError};

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = ["chrome", "storage", "local"], js_name = get, catch)]
    async fn storage_get(keys: &JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(js_namespace = ["chrome", "storage", "local"], js_name = set, catch)]
    async fn storage_set(items: &JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(js_namespace = ["chrome", "storage", "local"], js_name = remove, catch)]
    async fn storage_remove(keys: &JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(js_namespace = ["chrome", "storage", "onChanged"], js_name = addListener)]
    fn add_storage_listener(callback: &Closure<dyn FnMut(JsValue, JsValue)>);

    #[wasm_bindgen(js_namespace = ["chrome", "runtime"], js_name = sendMessage, catch)]
    async fn runtime_send_message(message: &JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(js_namespace = ["chrome", "runtime", "onMessage"], js_name = addListener)]
    fn add_message_listener(callback: &Closure<dyn FnMut(JsValue, JsValue)>);

    #[wasm_bindgen(js_namespace = ["chrome", "tabs"], js_name = query, catch)]
    async fn tabs_query(query: &JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(js_namespace = ["chrome", "tabs"], js_name = sendMessage, catch)]
    async fn tabs_send_message(tab_id: i32, message: &JsValue) -> Result<JsValue, JsValue>;
}

pub(crate) fn js_err(error: JsValue) -> String {
    if let Some(value) = error.as_string() {
        return value;
    }
    if let Ok(json) = js_sys::JSON::stringify(&error) {
        if let Some(value) = json.as_string() {
            return value;
        }
    }
    "js error".to_string()
}

/// `chrome.storage.local`. Values are kept as base64 text.
#[derive(Clone, Copy, Default)]
pub struct ChromeStorage;

impl StorageArea for ChromeStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let items = storage_get(&JsValue::from_str(key))
            .await
            .map_err(|err| StorageError::Backend(js_err(err)))?;
        let value = js_sys::Reflect::get(&items, &JsValue::from_str(key))
            .map_err(|err| StorageError::Backend(js_err(err)))?;
        let Some(raw) = value.as_string().filter(|raw| !raw.trim().is_empty()) else {
            return Ok(None);
        };
        let bytes = decode_text(&raw);
        if bytes.is_none() {
            console::warn(&format!("{key}: stored value is not base64"));
        }
        Ok(bytes)
    }

    async fn set(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let items = js_sys::Object::new();
        js_sys::Reflect::set(
            &items,
            &JsValue::from_str(key),
            &JsValue::from_str(&encode_text(&bytes)),
        )
        .map_err(|err| StorageError::Backend(js_err(err)))?;
        storage_set(&items)
            .await
            .map_err(|err| StorageError::Backend(js_err(err)))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        storage_remove(&JsValue::from_str(key))
            .await
            .map_err(|err| StorageError::Backend(js_err(err)))?;
        Ok(())
    }
}

/// Calls `listener` with every key that changes in extension storage.
pub(crate) fn on_storage_changed(listener: impl Fn(String) + 'static) {
    let callback = Closure::<dyn FnMut(JsValue, JsValue)>::new(move |changes: JsValue, _area: JsValue| {
        for key in js_sys::Object::keys(&js_sys::Object::from(changes)).iter() {
            if let Some(key) = key.as_string() {
                listener(key);
            }
        }
    });
    add_storage_listener(&callback);
    callback.forget();
}

/// Calls `listener` with every well-formed message and who sent it.
pub(crate) fn on_message(listener: impl Fn(Endpoint, ExtensionMsg) + 'static) {
    let callback = Closure::<dyn FnMut(JsValue, JsValue)>::new(move |message: JsValue, sender: JsValue| {
        let Some(msg) = js_sys::JSON::stringify(&message)
            .ok()
            .and_then(|raw| raw.as_string())
            .and_then(|raw| ExtensionMsg::from_json(&raw))
        else {
            return;
        };
        listener(sender_endpoint(&sender), msg);
    });
    add_message_listener(&callback);
    callback.forget();
}

fn sender_endpoint(sender: &JsValue) -> Endpoint {
    js_sys::Reflect::get(sender, &JsValue::from_str("tab"))
        .ok()
        .filter(|tab| tab.is_object())
        .and_then(|tab| js_sys::Reflect::get(&tab, &JsValue::from_str("id")).ok())
        .and_then(|id| id.as_f64())
        .map(|id| Endpoint::Tab(TabId(id as i32)))
        .unwrap_or(Endpoint::Page)
}

fn to_js(msg: &ExtensionMsg) -> Option<JsValue> {
    let raw = msg.to_json()?;
    js_sys::JSON::parse(&raw).ok()
}

/// `chrome.runtime` and `chrome.tabs` messaging. Sends are fire-and-forget;
/// a missing receiver only shows up in the debug log.
#[derive(Clone, Copy, Default)]
pub struct ChromeBus;

impl MessageBus for ChromeBus {
    fn send_to_background(&self, msg: &ExtensionMsg) {
        let Some(payload) = to_js(msg) else {
            return;
        };
        let kind = msg.kind();
        spawn_local(async move {
            if let Err(err) = runtime_send_message(&payload).await {
                console::debug(&format!("{kind} not delivered: {}", js_err(err)));
            }
        });
    }

    fn broadcast_to_tabs(&self, msg: &ExtensionMsg, except: Option<TabId>) {
        let Some(payload) = to_js(msg) else {
            return;
        };
        spawn_local(async move {
            let tabs = match tabs_query(&js_sys::Object::new().into()).await {
                Ok(tabs) => js_sys::Array::from(&tabs),
                Err(err) => {
                    console::warn(&format!("tab query failed: {}", js_err(err)));
                    return;
                }
            };
            for tab in tabs.iter() {
                let Some(id) = js_sys::Reflect::get(&tab, &JsValue::from_str("id"))
                    .ok()
                    .and_then(|id| id.as_f64())
                    .map(|id| id as i32)
                else {
                    continue;
                };
                if Some(TabId(id)) == except {
                    continue;
                }
                // Tabs without a content script reject; that is expected.
                let _ = tabs_send_message(id, &payload).await;
            }
        });
    }

    /// From the background, `runtime.sendMessage` reaches every open
    /// extension page.
    fn notify_pages(&self, msg: &ExtensionMsg) {
        self.send_to_background(msg);
    }
}

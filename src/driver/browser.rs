use super::{ClickMode, Cookie, Driver, ElementInfo, Locator, Tab};
use crate::config::BrowserConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use eoka::{Browser, Page};
use tokio::sync::Mutex;
use tracing::debug;

/// Query elements for a locator, optionally inside the first visible scope match.
const QUERY_JS: &str = r#"
((kind, css, text, scopeKind, scopeCss, scopeText) => {
    const lc = s => (s || '').toLowerCase().replace(/\s+/g, ' ').trim();
    const ROLE_TAGS = {
        button: 'button,[role="button"]',
        link: 'a[href],[role="link"]',
        option: 'option,[role="option"]',
        dialog: 'dialog,[role="dialog"],[role="alertdialog"]',
        textbox: 'input:not([type]),input[type="text"],textarea,[role="textbox"]',
        checkbox: 'input[type="checkbox"],[role="checkbox"]',
        radio: 'input[type="radio"],[role="radio"]',
        listbox: 'select,[role="listbox"]',
        combobox: '[role="combobox"]',
        row: 'tr,[role="row"]',
        gridcell: 'td,[role="gridcell"]',
        treeitem: '[role="treeitem"]',
        menuitem: '[role="menuitem"]',
        heading: 'h1,h2,h3,h4,[role="heading"]',
    };

    function selector(el) {
        if (el.id) return '#' + CSS.escape(el.id);
        const path = [];
        let n = el;
        while (n && n.nodeType === 1) {
            let s = n.tagName.toLowerCase();
            if (n.id) { path.unshift('#' + CSS.escape(n.id)); break; }
            const p = n.parentElement;
            if (p) {
                const sibs = [...p.children].filter(c => c.tagName === n.tagName);
                if (sibs.length > 1) s += ':nth-of-type(' + (sibs.indexOf(n) + 1) + ')';
            }
            path.unshift(s);
            n = p;
        }
        return path.join(' > ');
    }

    function visible(el) {
        const r = el.getBoundingClientRect();
        const s = getComputedStyle(el);
        return r.width > 0 && r.height > 0 && s.visibility !== 'hidden'
            && s.display !== 'none' && parseFloat(s.opacity) >= 0.1;
    }

    const label = el => (el.innerText || el.textContent || '').trim();
    const accName = el => el.getAttribute('aria-label') || label(el) || el.title || el.value || '';

    function all(root, sel) {
        try { return [...root.querySelectorAll(sel)]; } catch (_) { return []; }
    }

    function find(root, kind, css, text) {
        switch (kind) {
            case 'css':
                return all(root, css);
            case 'has_text':
                return all(root, css).filter(e => lc(label(e)).includes(lc(text)));
            case 'text': {
                const hits = all(root, 'a,button,label,span,div,li,td,h1,h2,h3,p,[role]')
                    .filter(e => lc(label(e)) === lc(text));
                return hits.filter(e => !hits.some(o => o !== e && e.contains(o)));
            }
            case 'role':
                return all(root, ROLE_TAGS[css] || '[role="' + css + '"]')
                    .filter(e => !text || lc(accName(e)) === lc(text));
        }
        return [];
    }

    let root = document;
    if (scopeKind) {
        root = find(document, scopeKind, scopeCss, scopeText).find(visible);
        if (!root) return '[]';
    }

    const ATTRS = ['id', 'role', 'aria-label', 'title', 'data-id', 'data-lp-id', 'placeholder',
        'type', 'name', 'col-id', 'aria-selected', 'aria-expanded', 'data-list-index'];

    const results = find(root, kind, css, text).map(el => {
        const attrs = {};
        for (const a of ATTRS) {
            const v = el.getAttribute(a);
            if (v !== null) attrs[a] = v;
        }
        const tag = el.tagName.toLowerCase();
        const c = el.closest('[id^="modalDialogRoot_"],[role="dialog"],[role="alertdialog"]');
        let container = null;
        if (c) {
            const heading = c.querySelector('[id^="dialogTitleView_"],h1,h2,[role="heading"]');
            container = {
                id: c.id || selector(c),
                title: ((heading && heading.innerText) || c.getAttribute('aria-label') || '').trim(),
            };
        }
        return {
            selector: selector(el),
            tag,
            text: label(el).slice(0, 200),
            value: ['input', 'textarea', 'select'].includes(tag) ? String(el.value ?? '') : '',
            visible: visible(el),
            checked: !!el.checked || el.getAttribute('aria-checked') === 'true',
            attrs,
            container,
        };
    });
    return JSON.stringify(results);
})
"#;

/// Deliver a synthetic click. Returns false when the element is missing.
const CLICK_JS: &str = r#"
((sel, mode, dx, dy) => {
    const el = document.querySelector(sel);
    if (!el) return false;
    el.scrollIntoView({ block: 'center' });
    const r = el.getBoundingClientRect();
    const opts = x => ({ bubbles: true, cancelable: true, view: window, clientX: x[0], clientY: x[1] });
    const sequence = (target, at) => {
        for (const t of ['pointerdown', 'mousedown', 'pointerup', 'mouseup', 'click']) {
            const ev = t.startsWith('pointer') ? new PointerEvent(t, opts(at)) : new MouseEvent(t, opts(at));
            target.dispatchEvent(ev);
        }
    };
    switch (mode) {
        case 'forced':
            sequence(el, [r.x + r.width / 2, r.y + r.height / 2]);
            return true;
        case 'offset': {
            const at = [r.x + dx, r.y + dy];
            sequence(document.elementFromPoint(at[0], at[1]) || el, at);
            return true;
        }
        case 'scripted':
            el.click();
            return true;
        case 'dispatched':
            el.dispatchEvent(new MouseEvent('click', { bubbles: true, cancelable: true, view: window }));
            return true;
        case 'double':
            el.click();
            el.click();
            el.dispatchEvent(new MouseEvent('dblclick', { bubbles: true, cancelable: true, view: window }));
            return true;
    }
    return false;
})
"#;

/// Install the dialog/mailto hook once per document and drain recorded messages.
const DIALOG_HOOK_JS: &str = r#"
(() => {
    if (!window.__caseflowHook) {
        window.__caseflowHook = true;
        window.__caseflowDialogs = [];
        const record = m => window.__caseflowDialogs.push(String(m ?? ''));
        window.alert = m => { record(m); };
        window.confirm = m => { record(m); return false; };
        window.prompt = m => { record(m); return null; };
        document.addEventListener('click', e => {
            const a = e.target && e.target.closest && e.target.closest('a[href^="mailto:"]');
            if (a) {
                e.preventDefault();
                record('blocked ' + a.href);
            }
        }, true);
    }
    return JSON.stringify(window.__caseflowDialogs.splice(0));
})()
"#;

const VALUE_JS: &str = r#"
((sel) => {
    const el = document.querySelector(sel);
    if (!el) return null;
    const tag = el.tagName.toLowerCase();
    if (tag === 'select') return (el.selectedOptions[0]?.text ?? '').trim();
    if (tag === 'input' || tag === 'textarea') return String(el.value ?? '');
    return (el.getAttribute('title') || el.innerText || '').trim();
})
"#;

fn js_str(s: &str) -> String {
    serde_json::Value::from(s).to_string()
}

struct Inner {
    browser: Browser,
    page: Page,
}

/// [`Driver`] backed by an `eoka` browser with one primary page.
pub struct EokaDriver {
    inner: Mutex<Inner>,
}

impl EokaDriver {
    /// Launch a browser with the given settings.
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        let stealth = eoka::StealthConfig {
            headless: config.headless,
            proxy: config.proxy.clone(),
            user_agent: config.user_agent.clone(),
            viewport_width: config.viewport.as_ref().map(|v| v.width).unwrap_or(1280),
            viewport_height: config.viewport.as_ref().map(|v| v.height).unwrap_or(720),
            ..Default::default()
        };

        debug!(
            "Launching browser (headless: {}, proxy: {:?})",
            config.headless, config.proxy
        );
        let browser = Browser::launch_with_config(stealth).await?;
        let page = browser.new_page("about:blank").await?;

        Ok(Self {
            inner: Mutex::new(Inner { browser, page }),
        })
    }

    /// Close the browser.
    pub async fn close(self) -> Result<()> {
        let inner = self.inner.into_inner();
        inner.browser.close().await?;
        Ok(())
    }
}

#[async_trait]
impl Driver for EokaDriver {
    async fn goto(&self, url: &str) -> Result<()> {
        let inner = self.inner.lock().await;
        inner.page.goto(url).await?;
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        let inner = self.inner.lock().await;
        inner.page.reload().await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        let inner = self.inner.lock().await;
        Ok(inner.page.url().await?)
    }

    async fn query(&self, locator: &Locator, scope: Option<&Locator>) -> Result<Vec<ElementInfo>> {
        let (kind, css, text) = locator.js_args();
        let (scope_kind, scope_css, scope_text) = scope.map(|s| s.js_args()).unwrap_or(("", "", ""));
        let js = format!(
            "{}({},{},{},{},{},{})",
            QUERY_JS,
            js_str(kind),
            js_str(css),
            js_str(text),
            js_str(scope_kind),
            js_str(scope_css),
            js_str(scope_text)
        );
        let inner = self.inner.lock().await;
        let json: String = inner.page.evaluate(&js).await?;
        Ok(serde_json::from_str(&json)?)
    }

    async fn click(&self, selector: &str, mode: ClickMode) -> Result<()> {
        let inner = self.inner.lock().await;
        let (dx, dy) = match mode {
            ClickMode::Standard => {
                inner.page.click(selector).await?;
                return Ok(());
            }
            ClickMode::Offset { x, y } => (x, y),
            _ => (0, 0),
        };
        let js = format!(
            "{}({},{},{},{})",
            CLICK_JS,
            js_str(selector),
            js_str(mode.name()),
            dx,
            dy
        );
        let clicked: bool = inner.page.evaluate(&js).await?;
        if clicked {
            Ok(())
        } else {
            Err(Error::NotFound(selector.to_string()))
        }
    }

    async fn focus(&self, selector: &str) -> Result<()> {
        let js = format!("document.querySelector({})?.focus()", js_str(selector));
        let inner = self.inner.lock().await;
        inner.page.execute(&js).await?;
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        let inner = self.inner.lock().await;
        inner.page.human().press_key(key).await?;
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let inner = self.inner.lock().await;
        inner.page.fill(selector, value).await?;
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        let inner = self.inner.lock().await;
        inner.page.type_text(text).await?;
        Ok(())
    }

    async fn value_of(&self, selector: &str) -> Result<Option<String>> {
        let js = format!("{}({})", VALUE_JS, js_str(selector));
        let inner = self.inner.lock().await;
        Ok(inner.page.evaluate(&js).await?)
    }

    async fn page_text(&self) -> Result<String> {
        let inner = self.inner.lock().await;
        Ok(inner.page.text().await?)
    }

    async fn extra_tabs(&self) -> Result<Vec<Tab>> {
        let inner = self.inner.lock().await;
        let primary = inner.page.target_id().to_string();
        Ok(inner
            .browser
            .tabs()
            .await?
            .into_iter()
            .filter(|t| t.id != primary)
            .map(|t| Tab { id: t.id, url: t.url })
            .collect())
    }

    async fn close_tab(&self, id: &str) -> Result<()> {
        let inner = self.inner.lock().await;
        inner.browser.close_tab(id).await?;
        let primary = inner.page.target_id().to_string();
        inner.browser.activate_tab(&primary).await?;
        Ok(())
    }

    async fn take_suppressed_dialogs(&self) -> Result<Vec<String>> {
        let inner = self.inner.lock().await;
        let json: String = inner.page.evaluate(DIALOG_HOOK_JS).await?;
        Ok(serde_json::from_str(&json)?)
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let inner = self.inner.lock().await;
        Ok(inner.page.screenshot().await?)
    }

    async fn cookies(&self) -> Result<Vec<Cookie>> {
        let inner = self.inner.lock().await;
        let raw = inner.page.cookies().await?;
        Ok(serde_json::from_value(serde_json::to_value(&raw)?)?)
    }

    async fn restore_cookies(&self, cookies: &[Cookie]) -> Result<()> {
        let inner = self.inner.lock().await;
        for c in cookies {
            inner
                .page
                .set_cookie(&c.name, &c.value, c.domain.as_deref(), c.path.as_deref())
                .await?;
        }
        Ok(())
    }
}

/// Portal addresses and the UI anchors the login sequence depends on.
/// The XPaths are tied to the portal's Angular Material layout and break
/// whenever it is redesigned.

pub const PORTAL_LOGIN_URL: &str = "https://agenciavirtual.neoenergia.com/#/login";
pub const PORTAL_API_ROOT: &str = "https://apineprd.neoenergia.com";

/// Local storage key the portal writes the session blob to after login.
pub const TOKEN_STORAGE_KEY: &str = "tokenNeSe";

pub(crate) const LOGIN_BUTTON_XPATH: &str =
    "/html/body/app-root/app-header/header/nav/div[1]/div/div/button/span[1]";
pub(crate) const USER_FIELD_XPATH: &str = "/html/body/div[2]/div[2]/div/mat-dialog-container/app-dialog-login/mat-dialog-content/section/form/mat-horizontal-stepper/div[2]/div/div/mat-form-field[1]/div/div[1]/div[3]/input";
pub(crate) const PASSWORD_FIELD_XPATH: &str = "/html/body/div[2]/div[2]/div/mat-dialog-container/app-dialog-login/mat-dialog-content/section/form/mat-horizontal-stepper/div[2]/div/div/mat-form-field[2]/div/div[1]/div[3]/input";
pub(crate) const SUBMIT_XPATH: &str = "/html/body/div[2]/div[2]/div/mat-dialog-container/app-dialog-login/mat-dialog-content/section/form/mat-horizontal-stepper/div[2]/div/div/div[3]/app-neo-button/button/div";

pub(crate) const READY_STATE_SCRIPT: &str = "return document.readyState";

pub(crate) fn token_script() -> String {
    format!(
        "return window.localStorage.getItem('{}');",
        TOKEN_STORAGE_KEY
    )
}

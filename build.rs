// Commands the hazard-map plugin exposes; each gets an `allow-` / `deny-`
// permission generated under permissions/autogenerated
#[cfg(feature = "desktop")]
const COMMANDS: &[&str] = &[
    "get_map_view",
    "long_press",
    "callout_press",
    "select_category",
    "dismiss_category",
    "toggle_legend",
    "resolve_alert",
    "resolve_position",
];

fn main() {
    // The headless build has no plugin surface
    #[cfg(feature = "desktop")]
    tauri_plugin::Builder::new(COMMANDS).build();
}

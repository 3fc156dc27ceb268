//! The M3 capability-advertisement body, bit-exact.

/// Fixed `wfd_video_formats` fields: this sink always advertises H.264
/// profile/level 0x03/0x10 with CEA entry 8 (1920x1080@60p) as native.
const NATIVE: u8 = 0x08;
const PREFERRED: u8 = 0x00;
const PROFILE: u8 = 0x03;
const LEVEL: u8 = 0x10;
const CEA_MASK: u32 = 0x0001_FFFF;
const VESA_MASK: u32 = 0x0FFF_FFFF;
const HH_MASK: u32 = 0x0000_0000;

/// Build the full M3 `GET_PARAMETER` response body: the `wfd_client_rtp_ports`
/// prefix line followed by the fixed capability block. Pure function of
/// `rtp_port` — everything else is a process-wide constant.
pub fn build_m3_body(rtp_port: u16) -> String {
    let mut body = String::new();
    body.push_str(&format!(
        "wfd_client_rtp_ports: RTP/AVP/UDP;unicast {rtp_port} 0 mode=play\r\n"
    ));
    body.push_str("wfd_audio_codecs: AAC 00000001 00, LPCM 00000002 00\r\n");
    body.push_str(&format!(
        "wfd_video_formats: {NATIVE:02X} {PREFERRED:02X} {PROFILE:02X} {LEVEL:02X} {CEA_MASK:08X} {VESA_MASK:08X} {HH_MASK:08X} 00 0000 0000 00 none none\r\n"
    ));
    body.push_str("wfd_3d_video_formats: none\r\n");
    body.push_str("wfd_coupled_sink: none\r\n");
    body.push_str("wfd_display_edid: none\r\n");
    body.push_str("wfd_connector_type: 05\r\n");
    body.push_str("wfd_uibc_capability: none\r\n");
    body.push_str("wfd_standby_resume_capability: none\r\n");
    body.push_str("wfd_content_protection: none\r\n");
    body
}

//greedy word wrap; a word wider than the line keeps a line of its own
pub fn wrap_text(text: &str, width: usize) -> Vec<String>{
    if text.chars().count() <= width{
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace(){
        let word_len = word.chars().count();
        if current.is_empty(){
            current.push_str(word);
            current_len = word_len;
        }
        else if current_len + 1 + word_len <= width{
            current.push(' ');
            current.push_str(word);
            current_len += 1 + word_len;
        }
        else{
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
            current_len = word_len;
        }
    }
    if !current.is_empty(){
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests{
    use super::*;

    #[test]
    fn test_short_text_is_one_line(){
        assert_eq!(wrap_text("usb 1-1: new device", 24), vec!["usb 1-1: new device"]);
        assert_eq!(wrap_text("", 24), vec![""]);
    }

    #[test]
    fn test_wraps_on_words(){
        let lines = wrap_text("EXT4-fs (sda1): mounted filesystem with ordered data mode", 24);
        assert_eq!(lines, vec!["EXT4-fs (sda1): mounted", "filesystem with ordered", "data mode"]);
        assert!(lines.iter().all(|l| l.chars().count() <= 24));
    }

    #[test]
    fn test_long_word_kept_whole(){
        let lines = wrap_text("see /sys/devices/platform/soc/fe201000.serial now", 10);
        assert_eq!(lines, vec!["see", "/sys/devices/platform/soc/fe201000.serial", "now"]);
    }
}

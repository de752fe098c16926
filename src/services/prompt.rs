const THUMBNAIL_GUIDELINES: &str = "\
Create a YouTube thumbnail that follows these best practices:
- Eye-catching and attention-grabbing design
- Always generate a 16:9 ratio thumbnail
- Bold, readable text that stands out
- High contrast colors for visibility
- Clear focal point (face, product, or main subject)
- Professional quality and composition
- Optimized for small screens (mobile-friendly)
- Conveys the video's content at a glance";

const REFERENCE_GUIDELINES: &str = "
- Use the provided reference image as a style guide or incorporate its elements
- Match the aesthetic, color scheme, or composition of the reference image";

/// Wrap the user's prompt in the thumbnail design brief sent to the provider.
pub fn build_thumbnail_prompt(user_prompt: &str, has_reference_image: bool) -> String {
    let mut prompt = String::from(THUMBNAIL_GUIDELINES);
    if has_reference_image {
        prompt.push_str(REFERENCE_GUIDELINES);
    }
    prompt.push_str("\n\nUser Request: ");
    prompt.push_str(user_prompt.trim());
    prompt
}
